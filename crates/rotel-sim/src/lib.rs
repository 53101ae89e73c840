//! Rotel Amplifier Simulation Library
//!
//! A stand-in for a Rotel network amplifier, for testing the client without
//! hardware. It includes:
//!
//! - **VirtualAmplifier**: tracks power/volume/mute/source and queues the
//!   `key=value$` reports a real unit would send
//! - **run_virtual_amp_task / serve**: drive it over a stream or a TCP
//!   listener, with injectable raw frames and configurable write chunking
//!
//! # Example
//!
//! ```rust
//! use rotel_sim::VirtualAmplifier;
//!
//! let mut amp = VirtualAmplifier::new("bench", "A14");
//! amp.process_bytes(b"power_on!vol_42!");
//!
//! assert_eq!(amp.drain_output(), b"power=on$volume=42$");
//! ```

pub mod amplifier;
pub mod amplifier_task;

pub use amplifier::{VirtualAmplifier, GREETING, MAX_VOLUME};
pub use amplifier_task::{
    run_virtual_amp_task, serve, SessionEnd, VirtualAmpCommand, VirtualAmpStateEvent,
};
