//! Fuzz test for the generic option API
//!
//! Applies arbitrary sequences of option writes and checks that an accepted
//! write of a recognized key always reads back.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rudt_transport::{OptionStore, OptionValue, TransportChannelConfig, TransportOption};

#[derive(Debug, Arbitrary)]
enum Payload {
    Int(i32),
    Size(u32),
    Bool(bool),
}

#[derive(Debug, Arbitrary)]
struct Op {
    option: u8,
    payload: Payload,
}

fuzz_target!(|ops: Vec<Op>| {
    let config = TransportChannelConfig::detached();

    for op in ops {
        let option = TransportOption::ALL[usize::from(op.option) % TransportOption::ALL.len()];
        let value = match op.payload {
            Payload::Int(v) => OptionValue::Int(v),
            Payload::Size(v) => OptionValue::Size(v as usize),
            Payload::Bool(v) => OptionValue::Bool(v),
        };

        match config.set_option(&option.key(), value) {
            Ok(true) => assert_eq!(config.option(&option.key()), Some(value)),
            Ok(false) => panic!("recognized key {} not stored", option.key()),
            Err(_) => assert_ne!(value.kind(), option.key().kind()),
        }
    }
});
