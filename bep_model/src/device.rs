use bep_proto::message::Compression;
use bep_util::device::DeviceId;
use url::Url;

/// Connection state of a remote device as tracked by the model.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum ConnectionState {
    Offline,
    Dialing,
    Connecting,
    Connected,
    Discovering,
    Discovered,
    Online,
    Unknown,
}

/// A device participating in the cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub cert_name: Option<String>,
    /// Addresses configured by the operator.
    pub static_uris: Vec<Url>,
    /// Addresses learned from discovery; replaced wholesale on refresh.
    pub dynamic_uris: Vec<Url>,
    pub compression: Compression,
    pub state: ConnectionState,
    /// Identifier of the connection currently serving this device.
    pub connection_id: Option<String>,
}

impl Device {
    pub fn new<N>(id: DeviceId, name: N) -> Device
    where
        N: Into<String>,
    {
        Device {
            id,
            name: name.into(),
            cert_name: None,
            static_uris: Vec::new(),
            dynamic_uris: Vec::new(),
            compression: Compression::Metadata,
            state: ConnectionState::Unknown,
            connection_id: None,
        }
    }

    /// All currently known addresses, static entries first.
    pub fn uris(&self) -> Vec<Url> {
        self.static_uris
            .iter()
            .chain(self.dynamic_uris.iter())
            .cloned()
            .collect()
    }

    pub fn is_online(&self) -> bool {
        self.state == ConnectionState::Online
    }
}
