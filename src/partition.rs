//! Index of the partitions reachable from the local host.

use crate::{
    layout::{PartitionHeader, PartitionTableEntry, GLOBAL_HOST, HOST_COUNT, PART_MAGIC},
    ptable::PartitionTable,
    region::Region,
    smem_err, Error,
};

/// Partition table entries of the global partition and of the private
/// partition shared with each remote host.
///
/// The index is built once during bring-up and never updated afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionIndex {
    global: Option<PartitionTableEntry>,
    hosts: [Option<PartitionTableEntry>; HOST_COUNT],
}

impl PartitionIndex {
    /// Creates an empty index.
    pub const fn new() -> Self {
        Self { global: None, hosts: [None; HOST_COUNT] }
    }

    /// Finds the global partition in `table` and validates its header.
    ///
    /// Fails with [`Error::InvalidFormat`] if the global partition is missing,
    /// malformed, or already selected.
    pub fn select_global_partition(&mut self, table: &PartitionTable<'_>) -> Result<(), Error> {
        if self.global.is_some() {
            smem_err!("already found the global partition");
            return Err(Error::InvalidFormat);
        }
        let mut found = None;
        for entry in table.entries() {
            let entry = entry?;
            if entry.is_active() && entry.host0 == GLOBAL_HOST && entry.host1 == GLOBAL_HOST {
                found = Some(entry);
                break;
            }
        }
        let Some(entry) = found else {
            smem_err!("missing entry for global partition");
            return Err(Error::InvalidFormat);
        };
        validate_header(table.region(), &entry)?;
        self.global = Some(entry);
        Ok(())
    }

    /// Records the private partition shared with every remote host that has
    /// one with `local_host`.
    ///
    /// Fails with [`Error::InvalidFormat`] on a remote host id out of range, on
    /// two partitions shared with the same remote host, or on a malformed
    /// partition header. The index is left unchanged on failure.
    pub fn enumerate(&mut self, table: &PartitionTable<'_>, local_host: u16) -> Result<(), Error> {
        let mut hosts = self.hosts;
        for entry in table.entries() {
            let entry = entry?;
            if !entry.is_active() {
                continue;
            }
            let remote = if entry.host0 == local_host {
                entry.host1
            } else if entry.host1 == local_host {
                entry.host0
            } else {
                continue;
            };
            let Some(slot) = hosts.get_mut(usize::from(remote)) else {
                smem_err!("bad host {}", remote);
                return Err(Error::InvalidFormat);
            };
            if slot.is_some() {
                smem_err!("duplicate host {}", remote);
                return Err(Error::InvalidFormat);
            }
            validate_header(table.region(), &entry)?;
            *slot = Some(entry);
        }
        self.hosts = hosts;
        Ok(())
    }

    /// Returns the global partition, if any.
    #[inline]
    pub fn global(&self) -> Option<&PartitionTableEntry> {
        self.global.as_ref()
    }

    /// Returns the private partition shared with `host`, if any.
    #[inline]
    pub fn host(&self, host: u16) -> Option<&PartitionTableEntry> {
        self.hosts.get(usize::from(host)).and_then(Option::as_ref)
    }

    /// Selects the partition serving `host`: its private partition if there is
    /// one, otherwise the global partition. `None` means the flat heap.
    pub fn select(&self, host: Option<u16>) -> Option<&PartitionTableEntry> {
        host.and_then(|host| self.host(host)).or(self.global.as_ref())
    }

    /// Returns `true` if no partition is indexed.
    pub fn is_empty(&self) -> bool {
        self.global.is_none() && self.hosts.iter().all(Option::is_none)
    }
}

/// Checks that the partition described by `entry` lies inside `region0` and
/// that its header agrees with the table entry.
pub fn validate_header(
    region0: &Region,
    entry: &PartitionTableEntry,
) -> Result<PartitionHeader, Error> {
    let (offset, size) = (entry.offset, entry.size);
    let end = offset.checked_add(size).map(|end| end as usize);
    if end.map_or(true, |end| end > region0.size()) || (size as usize) < PartitionHeader::LEN {
        smem_err!("bad partition bounds ({:#x}+{:#x})", offset, size);
        return Err(Error::InvalidFormat);
    }
    let header = PartitionHeader::read(region0, offset as usize)?;
    if header.magic != PART_MAGIC {
        smem_err!("bad partition magic {:02x?}", header.magic);
        return Err(Error::InvalidFormat);
    }
    if header.host0 != entry.host0 {
        smem_err!("bad host0 ({} != {})", entry.host0, header.host0);
        return Err(Error::InvalidFormat);
    }
    if header.host1 != entry.host1 {
        smem_err!("bad host1 ({} != {})", entry.host1, header.host1);
        return Err(Error::InvalidFormat);
    }
    if header.size != size {
        smem_err!("bad partition size ({} != {})", header.size, size);
        return Err(Error::InvalidFormat);
    }
    if header.offset_free_uncached > header.size {
        smem_err!(
            "bad partition free uncached ({} > {})",
            header.offset_free_uncached,
            header.size
        );
        return Err(Error::InvalidFormat);
    }
    Ok(header)
}
