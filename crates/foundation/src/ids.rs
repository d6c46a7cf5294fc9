/// Sequence number of an upload request.
///
/// Each new upload takes the next generation; a response is only applied if
/// its generation is still the latest one issued.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestGeneration(u64);

impl RequestGeneration {
    pub fn new(n: u64) -> Self {
        RequestGeneration(n)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        RequestGeneration(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for RequestGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
