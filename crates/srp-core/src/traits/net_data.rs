// # Network Data Publisher Trait
//
// The server advertises itself in Network Data either with its unicast
// address and port or as an anycast entry with a sequence number. Once
// the entry is actually added the publisher reports `EntryAdded`, which
// starts the server; `EntryRemoved` stops it.

/// Network Data publisher notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherEvent {
    /// The server's entry is present in Network Data
    EntryAdded,
    /// The server's entry was removed from Network Data
    EntryRemoved,
}

/// Publishes the DNS/SRP service entry in Network Data
pub trait NetDataPublisher: Send {
    /// Publish the unicast entry for `port`
    fn publish_unicast(&mut self, port: u16);

    /// Publish the anycast entry with `sequence_number`
    fn publish_anycast(&mut self, sequence_number: u8);

    /// Withdraw any published entry
    fn unpublish(&mut self);
}
