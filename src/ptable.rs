//! Partition table lookup.

use crate::{
    layout::{
        InfoBlock, PartitionTableEntry, PartitionTableHeader, INFO_MAGIC, ITEM_COUNT,
        PTABLE_MAGIC, PTABLE_OFFSET_FROM_END,
    },
    region::Region,
    smem_err, Error,
};

/// Supported partition table version.
pub const PTABLE_VERSION: u32 = 1;

/// The partition table at a fixed distance from the end of region 0.
#[derive(Clone, Copy, Debug)]
pub struct PartitionTable<'a> {
    region: &'a Region,
    base: usize,
    header: PartitionTableHeader,
}

impl<'a> PartitionTable<'a> {
    /// Finds and validates the partition table of `region0`.
    ///
    /// Fails with [`Error::NotFound`] if there is no table (the region holds a
    /// legacy flat heap), and with [`Error::Unsupported`] if the table version
    /// is unknown.
    pub fn locate(region0: &'a Region) -> Result<Self, Error> {
        let base = region0.size().checked_sub(PTABLE_OFFSET_FROM_END).ok_or(Error::NotFound)?;
        let header = PartitionTableHeader::read(region0, base).map_err(|_| Error::NotFound)?;
        if header.magic != PTABLE_MAGIC {
            return Err(Error::NotFound);
        }
        if header.version != PTABLE_VERSION {
            smem_err!("unsupported partition header version {}", header.version);
            return Err(Error::Unsupported);
        }
        Ok(Self { region: region0, base, header })
    }

    /// Returns the number of declared entries.
    #[inline]
    pub fn num_entries(&self) -> u32 {
        self.header.num_entries
    }

    /// Reads the entry number `index`.
    ///
    /// An entry that would lie outside region 0 is reported as
    /// [`Error::InvalidFormat`].
    pub fn entry(&self, index: u32) -> Result<PartitionTableEntry, Error> {
        let at = self.entry_offset(index).ok_or(Error::InvalidFormat)?;
        PartitionTableEntry::read(self.region, at)
    }

    /// Iterates over the declared entries.
    ///
    /// Iteration stops after the first entry that can't be read.
    pub fn entries(&self) -> Entries<'_, 'a> {
        Entries { table: self, index: 0, failed: false }
    }

    /// Returns the highest accepted item number declared by the info block
    /// following the last entry, or [`ITEM_COUNT`] if there is no info block.
    pub fn item_count(&self) -> u32 {
        self.entry_offset(self.header.num_entries)
            .and_then(|at| InfoBlock::read(self.region, at).ok())
            .filter(|info| info.magic == INFO_MAGIC)
            .map_or(ITEM_COUNT, |info| u32::from(info.num_items))
    }

    /// Returns the region holding the table.
    #[inline]
    pub fn region(&self) -> &'a Region {
        self.region
    }

    fn entry_offset(&self, index: u32) -> Option<usize> {
        (index as usize)
            .checked_mul(PartitionTableEntry::LEN)?
            .checked_add(self.base + PartitionTableHeader::LEN)
    }
}

/// Iterator over the entries of a [`PartitionTable`].
pub struct Entries<'t, 'a> {
    table: &'t PartitionTable<'a>,
    index: u32,
    failed: bool,
}

impl Iterator for Entries<'_, '_> {
    type Item = Result<PartitionTableEntry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.index >= self.table.num_entries() {
            return None;
        }
        let entry = self.table.entry(self.index);
        self.index += 1;
        self.failed = entry.is_err();
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{image::Image, layout::GLOBAL_HOST};

    #[test]
    fn missing_table() {
        let image = Image::new(0x4000);
        let region = image.region(0x8600_0000);
        assert_eq!(PartitionTable::locate(&region).err(), Some(Error::NotFound));
    }

    #[test]
    fn region_smaller_than_table_offset() {
        let image = Image::new(0x800);
        let region = image.region(0x8600_0000);
        assert_eq!(PartitionTable::locate(&region).err(), Some(Error::NotFound));
    }

    #[test]
    fn unsupported_version() {
        let mut image = Image::new(0x4000);
        let at = image.ptable_offset();
        image.ptable(&[]).poke_u32(at + 4, 2);
        let region = image.region(0x8600_0000);
        assert_eq!(PartitionTable::locate(&region).err(), Some(Error::Unsupported));
    }

    #[test]
    fn entries_and_default_item_count() {
        let mut image = Image::new(0x4000);
        image.ptable(&[
            PartitionTableEntry {
                offset: 0x2000,
                size: 0x1000,
                host0: GLOBAL_HOST,
                host1: GLOBAL_HOST,
                cacheline: 64,
                ..Default::default()
            },
            PartitionTableEntry::default(),
        ]);
        let region = image.region(0x8600_0000);
        let table = PartitionTable::locate(&region).unwrap();
        assert_eq!(table.num_entries(), 2);
        let entries = table.entries().collect::<Result<Vec<_>, _>>().unwrap();
        assert!(entries[0].is_active());
        assert_eq!(entries[0].cacheline, 64);
        assert!(!entries[1].is_active());
        assert_eq!(table.item_count(), ITEM_COUNT);
    }

    #[test]
    fn info_block_item_count() {
        let mut image = Image::new(0x4000);
        image.ptable(&[PartitionTableEntry::default()]).info_block(1024);
        let region = image.region(0x8600_0000);
        assert_eq!(PartitionTable::locate(&region).unwrap().item_count(), 1024);
    }

    #[test]
    fn runaway_entry_count_stops_iteration() {
        let mut image = Image::new(0x4000);
        let at = image.ptable_offset();
        image.ptable(&[]).poke_u32(at + 8, u32::MAX);
        let region = image.region(0x8600_0000);
        let table = PartitionTable::locate(&region).unwrap();
        let results = table.entries().collect::<Vec<_>>();
        assert_eq!(results.last(), Some(&Err(Error::InvalidFormat)));
        assert!(results.len() < 100);
        assert_eq!(table.item_count(), ITEM_COUNT);
    }
}
