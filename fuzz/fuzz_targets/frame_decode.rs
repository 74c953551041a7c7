//! Fuzz target for Frame::decode
//!
//! Feeds arbitrary byte sequences to the frame parser to find:
//! - Parser crashes or panics
//! - Integer overflows in size calculations
//! - Buffer over-reads
//!
//! The fuzzer should NEVER panic. All invalid inputs must return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use movantchat_proto::Frame;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic, only return Err
    let _ = Frame::decode(data);
});
