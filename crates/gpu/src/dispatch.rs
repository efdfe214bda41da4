//! The dispatch engine: fills slots, submits compute work, drains
//! results, and keeps the resume position and record log up to date.
//!
//! Grounded in `dispatch_gpu`/`dispatch_mining_batch` and the
//! slot/bind-group/queue-submit flow in the teacher's GPU crate,
//! generalized from a single fire-and-forget batch to the rolling,
//! double-buffered pipeline described in the module spec.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytemuck::cast_slice;
use futures::channel::oneshot;

use collatz_search_core::{Position, Record, RecordLog, StartValue, StopTime};

use crate::error::GpuError;
use crate::resources::{Params, ResourceSet, SlotState, StartValueIn};

/// Cooperative cancellation flag, shared with `facade::watcher`.
#[derive(Clone)]
pub struct CancelFlag(pub Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, unset flag.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Whether cancellation has been requested.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Request cancellation.
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one full `run_dispatch` loop invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOutcome {
    /// Records discovered during this loop body.
    pub records_found: u32,
    /// Set when the loop stopped early: a cancellation request or
    /// exhaustion of the 128-bit starting-value space.
    pub cancelled: bool,
}

/// Owns the GPU resources, the queue, and the host-side resume state.
pub struct DispatchEngine {
    device: wgpu::Device,
    queue: wgpu::Queue,
    resources: ResourceSet,
    position: Position,
    records: RecordLog,
    cancel: CancelFlag,
    first_dispatch: bool,
    /// The `StartValue` each slot was last filled from, recorded at
    /// `fill_slot` time so `drain_slot` can label results correctly
    /// even after `position.cur_start_value` has since advanced.
    slot_bases: Vec<StartValue>,
}

fn anchors_to_pairs(values: &[StartValue; 3]) -> [(u32, u32); 3] {
    [
        values[0].to_u32_halves(),
        values[1].to_u32_halves(),
        values[2].to_u32_halves(),
    ]
}

impl DispatchEngine {
    /// Wrap an initialised device/queue/resource set around a starting
    /// `Position` and shared cancellation flag.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        resources: ResourceSet,
        position: Position,
        cancel: CancelFlag,
    ) -> Self {
        let slot_count = resources.slots.len();
        Self {
            device,
            queue,
            resources,
            position,
            records: RecordLog::new(),
            cancel,
            first_dispatch: true,
            slot_bases: vec![StartValue::ONE; slot_count],
        }
    }

    /// The current resume position.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Every record discovered so far.
    pub fn records(&self) -> &RecordLog {
        &self.records
    }

    fn slot_base_value(&self, slot_index: usize) -> StartValue {
        let stride = self.resources.geometry.values_per_inout as u128;
        let offset = stride * slot_index as u128;
        self.position
            .cur_start_value
            .checked_add(offset)
            .unwrap_or(self.position.cur_start_value)
    }

    /// Write `values_per_inout` consecutive `StartValue`s into the
    /// slot's device-local input buffer, and refresh the slot's uniform
    /// params with the latest best stop time and anchor arrays.
    ///
    /// Every candidate is written as a genuine value — record-breaking
    /// stopping times occur at even starting values too (see OEIS
    /// A006877), so none are pre-filtered as sentinels. The shader's
    /// sentinel check (`lo == 0 && hi == 0`) stays in place as a
    /// defensive no-op: a real `StartValue` is never zero.
    pub fn fill_slot(&mut self, slot_index: usize) -> Result<(), GpuError> {
        let base = self.slot_base_value(slot_index);
        self.slot_bases[slot_index] = base;
        let count = self.resources.geometry.values_per_inout;

        let mut values = Vec::with_capacity(count as usize);
        for i in 0..count as u128 {
            let candidate = base.checked_add(i).unwrap_or(base);
            let (lo, hi) = candidate.to_u32_halves();
            values.push(StartValueIn { lo, hi });
        }

        let slot = &mut self.resources.slots[slot_index];
        self.queue.write_buffer(&slot.input_device, 0, cast_slice(&values));

        let params = Params::new(
            self.position.best_stop_time.0 as u32,
            anchors_to_pairs(&self.position.val0mod1off),
            anchors_to_pairs(&self.position.val1mod6off),
        );
        self.queue
            .write_buffer(&slot.params, 0, cast_slice(std::slice::from_ref(&params)));

        slot.state = SlotState::Filling;
        Ok(())
    }

    /// Encode and submit the compute dispatch plus the device-local to
    /// staging copy in one command buffer, mirroring the teacher's
    /// `dispatch_gpu` shape.
    pub fn submit_slot(&mut self, slot_index: usize) -> Result<(), GpuError> {
        let workgroup_size = self.resources.geometry.workgroup_size;
        let values_per_inout = self.resources.geometry.values_per_inout;
        let slot = &self.resources.slots[slot_index];

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("collatz-search-encoder"),
            });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("collatz-search-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.resources.pipeline);
            pass.set_bind_group(0, &slot.bind_group, &[]);
            let groups = (values_per_inout + workgroup_size - 1) / workgroup_size;
            pass.dispatch_workgroups(groups, 1, 1);
        }

        let output_size = (values_per_inout as u64) * (std::mem::size_of::<u32>() as u64);
        encoder.copy_buffer_to_buffer(&slot.output_device, 0, &slot.output_staging, 0, output_size);

        self.queue.submit(Some(encoder.finish()));
        self.resources.slots[slot_index].state = SlotState::Computing;
        Ok(())
    }

    /// Map the slot's staging buffer, read results, unmap, and
    /// transition `Draining -> Ready -> Idle`.
    pub fn drain_slot(&mut self, slot_index: usize) -> Result<Vec<(StartValue, StopTime)>, GpuError> {
        self.resources.slots[slot_index].state = SlotState::Draining;
        let base = self.slot_bases[slot_index];

        let (sender, receiver) = oneshot::channel();
        {
            let slot = &self.resources.slots[slot_index];
            slot.output_staging
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |res| {
                    let _ = sender.send(res);
                });
        }

        self.device.poll(wgpu::Maintain::Wait);

        pollster::block_on(receiver)
            .map_err(|e| GpuError::Internal(format!("failed to receive map result: {e}")))?
            .map_err(|e| GpuError::Internal(format!("failed to map results: {e:?}")))?;

        let results = {
            let slot = &self.resources.slots[slot_index];
            let mapped = slot.output_staging.slice(..).get_mapped_range();
            let words: &[u32] = cast_slice(&mapped);
            let mut out = Vec::with_capacity(words.len());
            for (i, &stop_time) in words.iter().enumerate() {
                let value = base.checked_add(i as u128).unwrap_or(base);
                out.push((value, StopTime(stop_time.min(u16::MAX as u32) as u16)));
            }
            out
        };
        self.resources.slots[slot_index].output_staging.unmap();

        self.resources.slots[slot_index].state = SlotState::Ready;
        self.resources.slots[slot_index].state = SlotState::Idle;
        Ok(results)
    }

    /// For each result whose stop time exceeds the current best,
    /// register a record and append it to the log. A stop time of `0`
    /// for anything other than `StartValue(1)` would mean a sentinel
    /// slipped through (it shouldn't, since `fill_slot` no longer
    /// writes any); guard against it rather than record a bogus `0`.
    pub fn analyse(&mut self, results: &[(StartValue, StopTime)]) -> u32 {
        let mut found = 0;
        for &(value, stop_time) in results {
            if stop_time.0 == 0 && value != StartValue::ONE {
                continue;
            }
            if stop_time > self.position.best_stop_time {
                self.position.register_record(value, stop_time);
                self.records.push(Record { value, stop_time });
                tracing::info!(value = %value, stop_time = %stop_time, "new record");
                found += 1;
            }
        }
        found
    }

    /// Advance `cur_start_value` by one full dispatch's worth of values
    /// across every slot in the heap.
    fn advance_position(&mut self) -> bool {
        let values_per_inout = self.resources.geometry.values_per_inout as u64;
        let inouts_per_heap = self.resources.geometry.inouts_per_heap();
        self.position.advance(values_per_inout, inouts_per_heap).is_some()
    }

    /// One steady-state loop body: fills every slot on the first call;
    /// on later calls, waits on each slot's prior submission before
    /// analysing and refilling it. Checks the cancellation flag at the
    /// top of each slot iteration.
    pub fn run_dispatch(&mut self) -> Result<DispatchOutcome, GpuError> {
        let mut outcome = DispatchOutcome::default();
        let slot_count = self.resources.slots.len();

        if self.first_dispatch {
            for i in 0..slot_count {
                self.fill_slot(i)?;
                self.submit_slot(i)?;
            }
            self.first_dispatch = false;
            return Ok(outcome);
        }

        // Advance before refilling: `fill_slot` derives a slot's base
        // from the live position, so each slot's next tile must start
        // one full heap-stride past where it left off. `drain_slot`
        // still labels results correctly because it reads the base
        // recorded in `slot_bases` at fill time, not the (now-advanced)
        // live position.
        if !self.advance_position() {
            outcome.cancelled = true; // 128-bit space exhausted
            return Ok(outcome);
        }

        for i in 0..slot_count {
            if self.cancel.is_set() {
                outcome.cancelled = true;
                return Ok(outcome);
            }
            let results = self.drain_slot(i)?;
            outcome.records_found += self.analyse(&results);
            self.fill_slot(i)?;
            self.submit_slot(i)?;
        }

        Ok(outcome)
    }

    /// Wait out every slot currently not `Idle`, analysing results as
    /// they complete, so no in-flight record is lost. Uses a bounded
    /// poll loop with a timeout during forced shutdown to avoid hanging
    /// on a lost GPU.
    pub fn drain_in_flight(&mut self, timeout: Duration) {
        let start = std::time::Instant::now();
        for i in 0..self.resources.slots.len() {
            if self.resources.slots[i].state == SlotState::Idle {
                continue;
            }
            loop {
                self.device.poll(wgpu::Maintain::Poll);
                if start.elapsed() > timeout {
                    tracing::warn!(slot = i, "drain timed out, abandoning slot");
                    break;
                }
                match self.drain_slot(i) {
                    Ok(results) => {
                        self.analyse(&results);
                        break;
                    }
                    Err(_) => continue,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_round_trips() {
        let flag = CancelFlag::new();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
    }
}
