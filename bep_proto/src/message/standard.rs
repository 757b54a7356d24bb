//! Controlled wire protocol message parsing and serializing.

use std::io::{self, Write};

use bep_util::device::DeviceId;
use bep_util::sha::Sha256Hash;
use bep_util::BlockHash;
use byteorder::{BigEndian, WriteBytesExt};
use nom::{be_u32, be_u64, be_u8, IResult};

use crate::message::file_info::{parse_file_info, FileInfo, Version};
use crate::message::{self, parse_blob, parse_string, Compression};

/// A peer's view of one device sharing a folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceEntry {
    pub id: DeviceId,
    pub max_sequence: u64,
    pub index_id: u64,
    pub compression: Compression,
}

impl DeviceEntry {
    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        writer.write_all(self.id.as_ref())?;
        writer.write_u64::<BigEndian>(self.max_sequence)?;
        writer.write_u64::<BigEndian>(self.index_id)?;
        writer.write_u8(self.compression.to_u8())
    }

    pub fn message_size(&self) -> usize {
        32 + 8 + 8 + 1
    }
}

named!(parse_device_entry<DeviceEntry>, do_parse!(
    id:           map_res!(take!(32), DeviceId::from_hash) >>
    max_sequence: be_u64 >>
    index_id:     be_u64 >>
    compression:  map_res!(be_u8, Compression::from_u8) >>
    (DeviceEntry { id, max_sequence, index_id, compression })
));

/// One folder stanza of a cluster config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderEntry {
    pub id: String,
    pub label: String,
    pub devices: Vec<DeviceEntry>,
}

impl FolderEntry {
    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        message::write_string(&mut writer, &self.id)?;
        message::write_string(&mut writer, &self.label)?;

        writer.write_u32::<BigEndian>(self.devices.len() as u32)?;
        for device in self.devices.iter() {
            device.write_bytes(&mut writer)?;
        }

        Ok(())
    }

    pub fn message_size(&self) -> usize {
        message::string_size(&self.id)
            + message::string_size(&self.label)
            + 4
            + self.devices.iter().map(|device| device.message_size()).sum::<usize>()
    }
}

named!(parse_folder_entry<FolderEntry>, do_parse!(
    id:      parse_string >>
    label:   parse_string >>
    devices: length_count!(be_u32, parse_device_entry) >>
    (FolderEntry { id, label, devices })
));

/// Exchange of folder membership and index positions, sent after hello.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ClusterConfigMessage {
    pub folders: Vec<FolderEntry>,
}

impl ClusterConfigMessage {
    pub fn from_bytes(bytes: &[u8]) -> IResult<&[u8], ClusterConfigMessage> {
        parse_cluster_config(bytes)
    }

    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        writer.write_u32::<BigEndian>(self.folders.len() as u32)?;
        for folder in self.folders.iter() {
            folder.write_bytes(&mut writer)?;
        }

        Ok(())
    }

    pub fn message_size(&self) -> usize {
        4 + self.folders.iter().map(|folder| folder.message_size()).sum::<usize>()
    }
}

named!(parse_cluster_config<ClusterConfigMessage>, do_parse!(
    folders: length_count!(be_u32, parse_folder_entry) >>
    (ClusterConfigMessage { folders })
));

// ----------------------------------------------------------------------------//

/// Full index snapshot or delta for one folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexMessage {
    pub folder: String,
    pub files: Vec<FileInfo>,
}

impl IndexMessage {
    pub fn from_bytes(bytes: &[u8]) -> IResult<&[u8], IndexMessage> {
        parse_index(bytes)
    }

    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        message::write_string(&mut writer, &self.folder)?;

        writer.write_u32::<BigEndian>(self.files.len() as u32)?;
        for file in self.files.iter() {
            file.write_bytes(&mut writer)?;
        }

        Ok(())
    }

    pub fn message_size(&self) -> usize {
        message::string_size(&self.folder)
            + 4
            + self.files.iter().map(|file| file.message_size()).sum::<usize>()
    }
}

named!(parse_index<IndexMessage>, do_parse!(
    folder: parse_string >>
    files:  length_count!(be_u32, parse_file_info) >>
    (IndexMessage { folder, files })
));

// ----------------------------------------------------------------------------//

/// Request for one block of a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestMessage {
    pub id: u64,
    pub folder: String,
    pub name: String,
    pub offset: u64,
    pub size: u32,
    pub hash: BlockHash,
}

impl RequestMessage {
    pub fn from_bytes(bytes: &[u8]) -> IResult<&[u8], RequestMessage> {
        parse_request(bytes)
    }

    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        writer.write_u64::<BigEndian>(self.id)?;
        message::write_string(&mut writer, &self.folder)?;
        message::write_string(&mut writer, &self.name)?;
        writer.write_u64::<BigEndian>(self.offset)?;
        writer.write_u32::<BigEndian>(self.size)?;
        writer.write_all(self.hash.as_ref())
    }

    pub fn message_size(&self) -> usize {
        8 + message::string_size(&self.folder) + message::string_size(&self.name) + 8 + 4 + 32
    }
}

named!(parse_request<RequestMessage>, do_parse!(
    id:     be_u64 >>
    folder: parse_string >>
    name:   parse_string >>
    offset: be_u64 >>
    size:   be_u32 >>
    hash:   map_res!(take!(32), Sha256Hash::from_hash) >>
    (RequestMessage { id, folder, name, offset, size, hash })
));

// ----------------------------------------------------------------------------//

/// Error code carried by a `Response`.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum ErrorCode {
    NoError,
    Generic,
    NoSuchFile,
    InvalidFile,
}

impl ErrorCode {
    pub fn from_u8(value: u8) -> Result<ErrorCode, u8> {
        match value {
            0 => Ok(ErrorCode::NoError),
            1 => Ok(ErrorCode::Generic),
            2 => Ok(ErrorCode::NoSuchFile),
            3 => Ok(ErrorCode::InvalidFile),
            other => Err(other),
        }
    }

    pub fn to_u8(&self) -> u8 {
        match *self {
            ErrorCode::NoError => 0,
            ErrorCode::Generic => 1,
            ErrorCode::NoSuchFile => 2,
            ErrorCode::InvalidFile => 3,
        }
    }
}

/// Block data (or error) answering a `Request`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseMessage {
    pub id: u64,
    pub data: Vec<u8>,
    pub code: ErrorCode,
}

impl ResponseMessage {
    pub fn from_bytes(bytes: &[u8]) -> IResult<&[u8], ResponseMessage> {
        parse_response(bytes)
    }

    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        writer.write_u64::<BigEndian>(self.id)?;
        message::write_blob(&mut writer, &self.data)?;
        writer.write_u8(self.code.to_u8())
    }

    pub fn message_size(&self) -> usize {
        8 + message::blob_size(&self.data) + 1
    }
}

named!(parse_response<ResponseMessage>, do_parse!(
    id:   be_u64 >>
    data: parse_blob >>
    code: map_res!(be_u8, ErrorCode::from_u8) >>
    (ResponseMessage { id, data, code })
));

// ----------------------------------------------------------------------------//

/// Progress of one file inside a `DownloadProgress` message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub name: String,
    pub version: Version,
    pub block_indexes: Vec<u32>,
}

impl ProgressUpdate {
    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        message::write_string(&mut writer, &self.name)?;
        self.version.write_bytes(&mut writer)?;

        writer.write_u32::<BigEndian>(self.block_indexes.len() as u32)?;
        for index in self.block_indexes.iter() {
            writer.write_u32::<BigEndian>(*index)?;
        }

        Ok(())
    }

    pub fn message_size(&self) -> usize {
        message::string_size(&self.name) + self.version.message_size() + 4 + self.block_indexes.len() * 4
    }
}

named!(parse_progress_update<ProgressUpdate>, do_parse!(
    name:          parse_string >>
    version:       call!(Version::from_bytes) >>
    block_indexes: length_count!(be_u32, be_u32) >>
    (ProgressUpdate { name, version, block_indexes })
));

/// Download progress notification; observed but never emitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadProgressMessage {
    pub folder: String,
    pub updates: Vec<ProgressUpdate>,
}

impl DownloadProgressMessage {
    pub fn from_bytes(bytes: &[u8]) -> IResult<&[u8], DownloadProgressMessage> {
        parse_download_progress(bytes)
    }

    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        message::write_string(&mut writer, &self.folder)?;

        writer.write_u32::<BigEndian>(self.updates.len() as u32)?;
        for update in self.updates.iter() {
            update.write_bytes(&mut writer)?;
        }

        Ok(())
    }

    pub fn message_size(&self) -> usize {
        message::string_size(&self.folder)
            + 4
            + self.updates.iter().map(|update| update.message_size()).sum::<usize>()
    }
}

named!(parse_download_progress<DownloadProgressMessage>, do_parse!(
    folder:  parse_string >>
    updates: length_count!(be_u32, parse_progress_update) >>
    (DownloadProgressMessage { folder, updates })
));

// ----------------------------------------------------------------------------//

/// Orderly session termination with a structured reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseMessage {
    pub reason: String,
}

impl CloseMessage {
    pub fn new<R>(reason: R) -> CloseMessage
    where
        R: Into<String>,
    {
        CloseMessage {
            reason: reason.into(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> IResult<&[u8], CloseMessage> {
        parse_close(bytes)
    }

    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        message::write_string(&mut writer, &self.reason)
    }

    pub fn message_size(&self) -> usize {
        message::string_size(&self.reason)
    }
}

named!(parse_close<CloseMessage>, do_parse!(
    reason: parse_string >>
    (CloseMessage { reason })
));

#[cfg(test)]
mod tests {
    use bep_util::device::DeviceId;
    use bep_util::sha::Sha256Hash;

    use crate::message::{Compression, Message};

    use super::{
        ClusterConfigMessage, CloseMessage, DeviceEntry, DownloadProgressMessage, ErrorCode,
        FolderEntry, IndexMessage, ProgressUpdate, RequestMessage, ResponseMessage,
    };
    use crate::message::file_info::{Counter, Version};

    fn round_trip(message: Message) {
        let mut buffer = Vec::new();
        message.write_payload(&mut buffer).unwrap();

        assert_eq!(buffer.len(), message.payload_size());
        assert_eq!(message, Message::from_parts(message.message_id(), &buffer).unwrap());
    }

    #[test]
    fn positive_cluster_config_round_trip() {
        round_trip(Message::ClusterConfig(ClusterConfigMessage {
            folders: vec![FolderEntry {
                id: "default".to_owned(),
                label: "Default Folder".to_owned(),
                devices: vec![
                    DeviceEntry {
                        id: DeviceId::from_der_cert(b"cert-one"),
                        max_sequence: 10,
                        index_id: 0x1122334455667788,
                        compression: Compression::Metadata,
                    },
                    DeviceEntry {
                        id: DeviceId::from_der_cert(b"cert-two"),
                        max_sequence: 0,
                        index_id: 42,
                        compression: Compression::Always,
                    },
                ],
            }],
        }));
    }

    #[test]
    fn positive_index_round_trip() {
        round_trip(Message::Index(IndexMessage {
            folder: "default".to_owned(),
            files: Vec::new(),
        }));
    }

    #[test]
    fn positive_request_round_trip() {
        round_trip(Message::Request(RequestMessage {
            id: 99,
            folder: "default".to_owned(),
            name: "some-file".to_owned(),
            offset: 0,
            size: 5,
            hash: Sha256Hash::from_bytes(b"12345"),
        }));
    }

    #[test]
    fn positive_response_round_trip() {
        round_trip(Message::Response(ResponseMessage {
            id: 99,
            data: b"12345".to_vec(),
            code: ErrorCode::NoError,
        }));

        round_trip(Message::Response(ResponseMessage {
            id: 100,
            data: Vec::new(),
            code: ErrorCode::NoSuchFile,
        }));
    }

    #[test]
    fn positive_download_progress_round_trip() {
        round_trip(Message::DownloadProgress(DownloadProgressMessage {
            folder: "default".to_owned(),
            updates: vec![ProgressUpdate {
                name: "some-file".to_owned(),
                version: Version::new(vec![Counter::new(1, 1)]),
                block_indexes: vec![0, 2, 4],
            }],
        }));
    }

    #[test]
    fn positive_ping_and_close_round_trip() {
        round_trip(Message::Ping);
        round_trip(Message::Close(CloseMessage::new("shutting down")));
    }

    #[test]
    fn negative_unknown_message_id() {
        assert!(Message::from_parts(200, &[]).is_err());
    }
}
