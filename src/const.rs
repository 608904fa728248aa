/// Number of lanes stepped together by one kernel invocation (one 256-bit register of `i16`)
pub const LANES: usize = 16;

/// Symbol code reserved for the start of every target sequence
pub const BOUNDARY: u8 = 0;
/// Size of the symbol code space, `ch & 31`
pub const ALPHABET_SIZE: usize = 32;
/// Score stored in row and column 0 of every substitution table
pub const SENTINEL: i16 = -32767;

pub const GAP_PENALTY: i16 = 10;
pub const BOUNDARY_PENALTY: i16 = 30000;
pub const REPORTING_THRESHOLD: i16 = 0;

pub const DEFAULT_MATRIX: &str = "BLOSUM62";
pub const DEFAULT_ALPHABET: &str = "ACDEFGHIKLMNPQRSTVWYBZX";
pub const DEFAULT_LANES: usize = 64;
pub const STEPS_PER_DISPATCH: usize = 256;

pub const STUB_THRESHOLD: i32 = 0;
pub const TWILIGHT_LOW: i32 = 20;
pub const TWILIGHT_HIGH: i32 = 40;
