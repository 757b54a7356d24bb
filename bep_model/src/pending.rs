use bep_util::device::DeviceId;

/// A device that contacted us but was not yet accepted by the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingDevice {
    pub id: DeviceId,
    pub name: String,
    pub last_seen_s: i64,
}

/// A device the operator explicitly declined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IgnoredDevice {
    pub id: DeviceId,
}

/// A folder offered by a peer but not yet accepted for sharing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingFolder {
    pub device: DeviceId,
    pub folder: String,
    pub label: String,
}

/// A folder offer the operator explicitly declined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IgnoredFolder {
    pub device: DeviceId,
    pub folder: String,
}
