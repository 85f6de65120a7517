// # DNS-SD Backends
//
// Backends shipped with the core crate. Adapters for real responders live
// in their own crates (`srp-dnssd-mdns`).

pub mod memory;

pub use memory::MemoryDnssd;
