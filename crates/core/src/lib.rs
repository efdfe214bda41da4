#![cfg_attr(not(feature = "std"), no_std)]

pub mod numeric;
pub mod position;
pub mod records;

#[allow(unused_extern_crates)]
extern crate alloc;

pub use numeric::{collatz_step, total_stopping_time, StartValue, StopTime};
pub use position::{codec, Position};
pub use records::{Record, RecordLog};
