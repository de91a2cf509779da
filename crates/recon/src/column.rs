/// The bytes found at one offset, one per input file.
///
/// Each value is paired with the index of the file it came from, and the
/// column remembers how many files the run started with. Filtering keeps both
/// pairings intact, so agreement is always measured against every input and
/// diagnostics can still name the file behind each byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteColumn {
    values: Vec<u8>,
    sources: Vec<usize>,
    num_files: usize,
}

impl ByteColumn {
    /// A full column: value `i` came from file `i`.
    pub fn new(values: Vec<u8>) -> Self {
        let num_files = values.len();
        Self {
            sources: (0..num_files).collect(),
            values,
            num_files,
        }
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    /// File index for each entry of `values()`.
    pub fn sources(&self) -> &[usize] {
        &self.sources
    }

    /// Number of input files in the run, regardless of filtering.
    pub fn num_files(&self) -> usize {
        self.num_files
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_unanimous(&self) -> bool {
        self.values.windows(2).all(|w| w[0] == w[1])
    }

    pub fn has_nulls(&self) -> bool {
        self.values.contains(&0x00)
    }

    /// True once entries have been removed from the original column.
    pub fn is_filtered(&self) -> bool {
        self.values.len() != self.num_files
    }

    /// Drop every 0x00 entry together with its file index.
    pub fn without_nulls(&self) -> ByteColumn {
        let (sources, values): (Vec<usize>, Vec<u8>) = self
            .contributions()
            .filter(|&(_, b)| b != 0x00)
            .unzip();
        ByteColumn {
            values,
            sources,
            num_files: self.num_files,
        }
    }

    /// `(file index, byte)` pairs.
    pub fn contributions(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.sources.iter().copied().zip(self.values.iter().copied())
    }
}
