/// First-fit bookkeeping of `[start, end)` ranges; no memory is touched.
#[derive(Debug, Clone)]
pub struct Ranges {
    start: u32,
    end: u32,
    /// `(start, len)`, sorted by start.
    used: Vec<(u32, u32)>,
}

impl Ranges {
    pub const fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end,
            used: Vec::new(),
        }
    }

    /// Gaps between used ranges, in address order.
    fn gaps(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let mut cursor = self.start;
        self.used
            .iter()
            .copied()
            .chain(std::iter::once((self.end, 0)))
            .filter_map(move |(at, len)| {
                let gap = (cursor, at.saturating_sub(cursor));
                cursor = at + len;
                (gap.1 > 0).then_some(gap)
            })
    }

    pub fn allocate(&mut self, len: u32, align: u32) -> Option<u32> {
        let at = self.gaps().find_map(|(gap, gap_len)| {
            let at = gap.next_multiple_of(align);
            (at + len <= gap + gap_len).then_some(at)
        })?;
        let index = self.used.partition_point(|&(s, _)| s < at);
        self.used.insert(index, (at, len));
        Some(at)
    }

    pub fn release(&mut self, at: u32) -> Option<u32> {
        let index = self.used.iter().position(|&(s, _)| s == at)?;
        Some(self.used.remove(index).1)
    }

    pub fn free_total(&self) -> u32 {
        self.gaps().map(|(_, len)| len).sum()
    }

    pub fn largest_free(&self) -> u32 {
        self.gaps().map(|(_, len)| len).max().unwrap_or(0)
    }

    pub fn live(&self) -> usize {
        self.used.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fit_and_gaps() {
        let mut r = Ranges::new(0x1000, 0x2000);
        let a = r.allocate(0x400, 0x10).unwrap();
        let b = r.allocate(0x400, 0x10).unwrap();
        assert_eq!((a, b), (0x1000, 0x1400));
        assert_eq!(r.release(a), Some(0x400));
        assert_eq!(r.allocate(0x100, 0x10), Some(0x1000));
        assert_eq!(r.largest_free(), 0x800);
        assert_eq!(r.free_total(), 0xB00);
        assert_eq!(r.allocate(0x1000, 0x10), None);
        assert_eq!(r.live(), 2);
    }
}
