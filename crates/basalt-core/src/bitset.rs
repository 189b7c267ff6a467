/// A growable set of bits, one per patch or tile, with cheap "is anything set" checks.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Bitset {
    words: Vec<u64>,
    len: usize,
}

impl Bitset {
    const WORD_BITS: usize = u64::BITS as usize;

    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; (len + Self::WORD_BITS - 1) / Self::WORD_BITS],
            len,
        }
    }

    pub fn all_set(len: usize) -> Self {
        let mut bits = Self::new(len);
        bits.set_all();
        bits
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn bit_is_set(&self, i: usize) -> bool {
        assert!(i < self.len);
        self.words[i / Self::WORD_BITS] & Self::mask(i) != 0
    }

    #[inline]
    pub fn set_bit(&mut self, i: usize) {
        assert!(i < self.len);
        self.words[i / Self::WORD_BITS] |= Self::mask(i);
    }

    #[inline]
    pub fn unset_bit(&mut self, i: usize) {
        assert!(i < self.len);
        self.words[i / Self::WORD_BITS] &= !Self::mask(i);
    }

    #[inline]
    pub fn assign_bit(&mut self, i: usize, value: bool) {
        if value {
            self.set_bit(i)
        } else {
            self.unset_bit(i)
        }
    }

    /// Unsets bit `i`, returning its previous value.
    #[inline]
    pub fn fetch_and_unset_bit(&mut self, i: usize) -> bool {
        let was_set = self.bit_is_set(i);
        self.unset_bit(i);
        was_set
    }

    pub fn set_all(&mut self) {
        for w in self.words.iter_mut() {
            *w = u64::MAX;
        }
        // Keep the bits past `len` clear so `count_ones` and `any` stay exact.
        let tail = self.len % Self::WORD_BITS;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last = (1 << tail) - 1;
            }
        }
    }

    pub fn unset_all(&mut self) {
        for w in self.words.iter_mut() {
            *w = 0;
        }
    }

    #[inline]
    pub fn any(&self) -> bool {
        self.words.iter().any(|&w| w != 0)
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            (0..Self::WORD_BITS)
                .filter(move |b| word & (1 << b) != 0)
                .map(move |b| wi * Self::WORD_BITS + b)
        })
    }

    #[inline]
    fn mask(i: usize) -> u64 {
        1 << (i % Self::WORD_BITS)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_all_respects_length() {
        let bits = Bitset::all_set(70);
        assert_eq!(bits.count_ones(), 70);
        assert_eq!(bits.iter_ones().last(), Some(69));
    }

    #[test]
    fn fetch_and_unset() {
        let mut bits = Bitset::new(130);
        bits.set_bit(129);
        bits.set_bit(3);
        assert!(bits.any());
        assert_eq!(bits.iter_ones().collect::<Vec<_>>(), vec![3, 129]);

        assert!(bits.fetch_and_unset_bit(129));
        assert!(!bits.fetch_and_unset_bit(129));
        bits.unset_bit(3);
        assert!(!bits.any());
    }
}
