// Copyright 2024 Oxide Computer Company

#![allow(clippy::too_many_arguments)]

#[cfg(test)]
mod compare;
#[cfg(test)]
mod counters;
#[cfg(test)]
mod exact;
#[cfg(test)]
mod laws;
#[cfg(test)]
mod router;

pub mod data;
pub mod harness;
pub mod packet;
