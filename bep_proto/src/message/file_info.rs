//! File metadata carried by Index, IndexUpdate, and DownloadProgress.

use std::io::{self, Write};

use bep_util::sha::Sha256Hash;
use bep_util::BlockHash;
use byteorder::{BigEndian, WriteBytesExt};
use nom::{be_u32, be_u64, be_u8, IResult};

use crate::message::{self, parse_bool, parse_string};

/// Type of the entry a `FileInfo` describes.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum FileInfoType {
    File,
    Directory,
    Symlink,
}

impl FileInfoType {
    pub fn from_u8(value: u8) -> Result<FileInfoType, u8> {
        match value {
            0 => Ok(FileInfoType::File),
            1 => Ok(FileInfoType::Directory),
            2 => Ok(FileInfoType::Symlink),
            other => Err(other),
        }
    }

    pub fn to_u8(&self) -> u8 {
        match *self {
            FileInfoType::File => 0,
            FileInfoType::Directory => 1,
            FileInfoType::Symlink => 2,
        }
    }
}

// ----------------------------------------------------------------------------//

/// Single entry of a version vector.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct Counter {
    pub id: u64,
    pub value: u64,
}

impl Counter {
    pub fn new(id: u64, value: u64) -> Counter {
        Counter { id, value }
    }
}

/// Version vector capturing the causal edit history of a file.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct Version {
    pub counters: Vec<Counter>,
}

impl Version {
    pub fn new(counters: Vec<Counter>) -> Version {
        Version { counters }
    }

    pub fn from_bytes(bytes: &[u8]) -> IResult<&[u8], Version> {
        parse_version(bytes)
    }

    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        writer.write_u32::<BigEndian>(self.counters.len() as u32)?;
        for counter in self.counters.iter() {
            writer.write_u64::<BigEndian>(counter.id)?;
            writer.write_u64::<BigEndian>(counter.value)?;
        }

        Ok(())
    }

    pub fn message_size(&self) -> usize {
        4 + self.counters.len() * 16
    }
}

named!(parse_counter<Counter>, do_parse!(
    id:    be_u64 >>
    value: be_u64 >>
    (Counter::new(id, value))
));

named!(parse_version<Version>, do_parse!(
    counters: length_count!(be_u32, parse_counter) >>
    (Version::new(counters))
));

// ----------------------------------------------------------------------------//

/// Reference to one content block of a file.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct BlockInfo {
    pub offset: u64,
    pub size: u32,
    pub hash: BlockHash,
}

impl BlockInfo {
    pub fn new(offset: u64, size: u32, hash: BlockHash) -> BlockInfo {
        BlockInfo { offset, size, hash }
    }

    pub fn from_bytes(bytes: &[u8]) -> IResult<&[u8], BlockInfo> {
        parse_block_info(bytes)
    }

    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        writer.write_u64::<BigEndian>(self.offset)?;
        writer.write_u32::<BigEndian>(self.size)?;
        writer.write_all(self.hash.as_ref())
    }

    pub fn message_size(&self) -> usize {
        8 + 4 + Sha256Hash::len()
    }
}

named!(parse_block_info<BlockInfo>, do_parse!(
    offset: be_u64 >>
    size:   be_u32 >>
    hash:   map_res!(take!(32), Sha256Hash::from_hash) >>
    (BlockInfo::new(offset, size, hash))
));

// ----------------------------------------------------------------------------//

/// File metadata as carried on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub file_type: FileInfoType,
    pub size: u64,
    pub permissions: u32,
    pub modified_s: i64,
    pub modified_ns: u32,
    pub sequence: u64,
    pub version: Version,
    pub block_size: u32,
    pub deleted: bool,
    pub invalid: bool,
    pub no_permissions: bool,
    pub symlink_target: String,
    pub blocks: Vec<BlockInfo>,
}

impl FileInfo {
    pub fn from_bytes(bytes: &[u8]) -> IResult<&[u8], FileInfo> {
        parse_file_info(bytes)
    }

    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        message::write_string(&mut writer, &self.name)?;
        writer.write_u8(self.file_type.to_u8())?;
        writer.write_u64::<BigEndian>(self.size)?;
        writer.write_u32::<BigEndian>(self.permissions)?;
        writer.write_i64::<BigEndian>(self.modified_s)?;
        writer.write_u32::<BigEndian>(self.modified_ns)?;
        writer.write_u64::<BigEndian>(self.sequence)?;
        self.version.write_bytes(&mut writer)?;
        writer.write_u32::<BigEndian>(self.block_size)?;
        message::write_bool(&mut writer, self.deleted)?;
        message::write_bool(&mut writer, self.invalid)?;
        message::write_bool(&mut writer, self.no_permissions)?;
        message::write_string(&mut writer, &self.symlink_target)?;

        writer.write_u32::<BigEndian>(self.blocks.len() as u32)?;
        for block in self.blocks.iter() {
            block.write_bytes(&mut writer)?;
        }

        Ok(())
    }

    pub fn message_size(&self) -> usize {
        message::string_size(&self.name)
            + 1
            + 8
            + 4
            + 8
            + 4
            + 8
            + self.version.message_size()
            + 4
            + 3
            + message::string_size(&self.symlink_target)
            + 4
            + self.blocks.iter().map(|block| block.message_size()).sum::<usize>()
    }
}

named!(pub parse_file_info<FileInfo>, do_parse!(
    name:           parse_string >>
    file_type:      map_res!(be_u8, FileInfoType::from_u8) >>
    size:           be_u64 >>
    permissions:    be_u32 >>
    modified_s:     map!(be_u64, |value| value as i64) >>
    modified_ns:    be_u32 >>
    sequence:       be_u64 >>
    version:        call!(Version::from_bytes) >>
    block_size:     be_u32 >>
    deleted:        parse_bool >>
    invalid:        parse_bool >>
    no_permissions: parse_bool >>
    symlink_target: parse_string >>
    blocks:         length_count!(be_u32, parse_block_info) >>
    (FileInfo {
        name,
        file_type,
        size,
        permissions,
        modified_s,
        modified_ns,
        sequence,
        version,
        block_size,
        deleted,
        invalid,
        no_permissions,
        symlink_target,
        blocks,
    })
));
