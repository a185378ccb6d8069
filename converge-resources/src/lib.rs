//! converge-resources: concrete resource types driven by `converge-core`.
//!
//! Each type implements [`converge_core::Resource`]: its schema table, desired
//! and canonical state, wire codec and planner. The engine does the rest.

pub mod event_bus;
pub mod network_interface;
pub mod response_headers_policy;

pub use event_bus::{EventBus, EventBusSpec, EventBusState};
pub use network_interface::{
    AddressPool, InterfaceDelta, NetworkInterface, NetworkInterfaceSpec, NetworkInterfaceState,
};
pub use response_headers_policy::{
    PolicyUpdate, ResponseHeadersPolicy, ResponseHeadersPolicySpec, ResponseHeadersPolicyState,
};
