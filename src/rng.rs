use rand::Rng;
use tracing::info;

/// Small deterministic RNG shared by every episode of one evaluation run.
///
/// Seeded once before the loop starts and never reseeded, so a fixed seed,
/// pool, and configuration replay the exact same episode sequence.
#[derive(Debug, Clone)]
pub struct EpisodeRng {
    state: u64,
}

impl EpisodeRng {
    /// Create a generator from `seed`.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Current internal state.
    pub fn state(&self) -> u64 {
        self.state
    }

    fn next_u64_internal(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9E3779B97F4A7C15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}

impl rand::RngCore for EpisodeRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64_internal() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u64_internal()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut offset = 0;
        while offset < dest.len() {
            let value = self.next_u64_internal();
            let bytes = value.to_le_bytes();
            let remaining = dest.len() - offset;
            let copy_len = remaining.min(bytes.len());
            dest[offset..offset + copy_len].copy_from_slice(&bytes[..copy_len]);
            offset += copy_len;
        }
    }
}

/// Use the configured seed, or draw one from the OS-seeded thread RNG.
///
/// The resolved seed is always logged so an unseeded run can be replayed.
pub fn resolve_seed(configured: Option<u64>) -> u64 {
    let seed = configured.unwrap_or_else(|| rand::rng().random());
    info!(seed, drawn = configured.is_none(), "random seed");
    seed
}
