//! Mocked entities used by the test suite and available to downstream
//! crates through the `mocks` feature.

pub mod serial_port;
pub mod transport_layer;
