//! Advertising bookkeeping shared by hosts and services

use std::fmt;

/// Identifier correlating a DNS-SD backend call with its completion
///
/// Ids are allocated from a monotonically increasing counter; zero is
/// never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// Wrap a raw id; zero is not a valid request id
    pub fn new(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    /// Raw id value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registration state of one host or service towards the DNS-SD backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvState {
    /// Entry is registered with the backend
    pub registered: bool,
    /// Entry's key is registered with the backend
    pub key_registered: bool,
    /// Outstanding registration id
    pub adv_id: Option<RequestId>,
    /// Outstanding key registration id
    pub key_adv_id: Option<RequestId>,
    /// Entry was superseded by a newer update
    pub replaced: bool,
    pub(crate) should_advertise: bool,
    pub(crate) should_register_key: bool,
}

impl AdvState {
    /// Registered, or a registration is in flight
    pub fn is_registered_or_registering(&self) -> bool {
        self.registered || self.adv_id.is_some()
    }

    /// Key registered, or a key registration is in flight
    pub fn is_key_registered_or_registering(&self) -> bool {
        self.key_registered || self.key_adv_id.is_some()
    }

    pub(crate) fn clear_ids(&mut self) {
        self.adv_id = None;
        self.key_adv_id = None;
    }
}

/// Contiguous range covering every outstanding id of one host batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdRange(Option<(RequestId, RequestId)>);

impl IdRange {
    /// Range with no ids
    pub fn empty() -> Self {
        Self(None)
    }

    /// Whether no id is outstanding
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Whether `id` falls inside the range
    pub fn contains(&self, id: RequestId) -> bool {
        matches!(self.0, Some((min, max)) if min <= id && id <= max)
    }

    /// Widen the range to include `id`, if any
    pub fn add(&mut self, id: Option<RequestId>) {
        let Some(id) = id else { return };

        self.0 = Some(match self.0 {
            Some((min, max)) => (min.min(id), max.max(id)),
            None => (id, id),
        });
    }

    /// Forget every id
    pub fn clear(&mut self) {
        self.0 = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> RequestId {
        RequestId::new(raw).unwrap()
    }

    #[test]
    fn test_zero_is_not_a_request_id() {
        assert!(RequestId::new(0).is_none());
        assert_eq!(id(5).get(), 5);
    }

    #[test]
    fn test_id_range() {
        let mut range = IdRange::empty();
        assert!(range.is_empty());
        assert!(!range.contains(id(1)));

        range.add(Some(id(4)));
        range.add(None);
        range.add(Some(id(2)));

        assert!(range.contains(id(2)));
        assert!(range.contains(id(3)));
        assert!(range.contains(id(4)));
        assert!(!range.contains(id(5)));

        range.clear();
        assert!(range.is_empty());
    }

    #[test]
    fn test_registered_or_registering() {
        let mut state = AdvState::default();
        assert!(!state.is_registered_or_registering());

        state.adv_id = Some(id(9));
        assert!(state.is_registered_or_registering());

        state.key_registered = true;
        assert!(state.is_key_registered_or_registering());

        state.clear_ids();
        assert!(state.adv_id.is_none());
    }
}
