// Copyright 2024 Oxide Computer Company

//! Driving STF scenarios against the BMv2 simple_switch target.
//!
//! A scenario is turned into `simple_switch_CLI` commands using the compiled
//! program description for name and width information, input packets are
//! fed to the switch through pcap FIFOs, and the pcap files the switch
//! writes for its output interfaces are checked against the expected
//! packets.

pub mod compare;
pub mod encode;
pub mod error;
pub mod executor;
pub mod expect;
pub mod lease;
pub mod pcap;
pub mod schema;
pub mod switch;

pub use error::Error;
