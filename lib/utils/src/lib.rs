#![no_std]

pub mod macros;
