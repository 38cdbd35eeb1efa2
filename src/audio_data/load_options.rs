/// Options applied by a [`SoundDecoder`](super::SoundDecoder) while decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Resample to this rate (None = keep the file's rate)
    pub target_sample_rate: Option<u32>,
    /// Downmix to mono after decoding
    pub convert_to_mono: bool,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional sound effects: mono at the output rate.
    pub fn for_sounds(sample_rate: u32) -> Self {
        Self::new().target_sample_rate(sample_rate).convert_to_mono(true)
    }

    /// Music streams: stereo at the output rate.
    pub fn for_music(sample_rate: u32) -> Self {
        Self::new().target_sample_rate(sample_rate)
    }

    pub fn target_sample_rate(mut self, rate: u32) -> Self {
        self.target_sample_rate = Some(rate);
        self
    }

    pub fn convert_to_mono(mut self, convert: bool) -> Self {
        self.convert_to_mono = convert;
        self
    }
}
