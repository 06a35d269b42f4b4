//! VM parameters

use static_assertions::const_assert;

/* VALUE TAG LAYOUT */

/// Number of tag bits at the bottom of every tagged word.
pub const DIRECT_SHIFT: u32 = 4;

/// Mask covering the tag bits of a tagged word.
pub const DIRECT_TYPE_MASK: u32 = (1 << DIRECT_SHIFT) - 1;

/// Tag of a direct (unboxed) integer.
///
/// Must be zero: the arithmetic and bitwise fast paths operate on the tagged
/// representation and rely on `0 op 0 == 0` for the tag bits.
pub const TAG_INTEGER: u32 = 0x0;

/// Tag of a boxed double.
pub const TAG_FLOAT: u32 = 0x1;

/// Tag of a heap string.
pub const TAG_STRING: u32 = 0x2;

/// Tag of a heap symbol.
pub const TAG_SYMBOL: u32 = 0x3;

/// Tag of a heap object (including lexical environments).
pub const TAG_OBJECT: u32 = 0x4;

/// Tag of an internal collection reference (for-in name lists, spread
/// argument lists). Never script-visible.
pub const TAG_COLLECTION: u32 = 0x5;

/// Tag of a simple immediate (booleans, null, undefined and the
/// interpreter-internal sentinels).
pub const TAG_SIMPLE: u32 = 0x7;

/* INTEGER FAST PATH */

/// Largest integer representable without boxing.
pub const INTEGER_NUMBER_MAX: i32 = 0x07ff_ffff;

/// Smallest integer representable without boxing.
pub const INTEGER_NUMBER_MIN: i32 = -0x0800_0000;

/// Same bound on the shifted (tagged) representation, used by the
/// increment/decrement fast path which adds `1 << DIRECT_SHIFT` in place.
pub const INTEGER_NUMBER_MAX_SHIFTED: i32 = INTEGER_NUMBER_MAX << DIRECT_SHIFT;

/// See [`INTEGER_NUMBER_MAX_SHIFTED`].
pub const INTEGER_NUMBER_MIN_SHIFTED: i32 = INTEGER_NUMBER_MIN << DIRECT_SHIFT;

/// Multiplication operand bound: `INTEGER_MULTIPLY_MAX²` stays inside the
/// unboxed integer range.
pub const INTEGER_MULTIPLY_MAX: i32 = 0x2d41;

const_assert!(INTEGER_MULTIPLY_MAX as i64 * INTEGER_MULTIPLY_MAX as i64 <= INTEGER_NUMBER_MAX as i64);
const_assert!(-(INTEGER_MULTIPLY_MAX as i64 * INTEGER_MULTIPLY_MAX as i64) >= INTEGER_NUMBER_MIN as i64);
const_assert!(INTEGER_NUMBER_MAX as i64 * 2 <= i32::MAX as i64);
const_assert!(INTEGER_NUMBER_MIN as i64 * 2 >= i32::MIN as i64);

/* LITERAL INDEX ENCODING */

/// One-byte literal indices below this limit encode themselves.
pub const SMALL_LITERAL_ENCODING_LIMIT: u16 = 255;

/// Subtracted from the two-byte form of a small-encoded literal index.
pub const SMALL_LITERAL_ENCODING_DELTA: u16 = 0xfe01;

/// See [`SMALL_LITERAL_ENCODING_LIMIT`]; variant selected by the
/// `FULL_LITERAL_ENCODING` header flag.
pub const FULL_LITERAL_ENCODING_LIMIT: u16 = 128;

/// See [`SMALL_LITERAL_ENCODING_DELTA`].
pub const FULL_LITERAL_ENCODING_DELTA: u16 = 0x8000;

/* CONTEXT RECORD STACK ALLOCATIONS */

/// Stack slots occupied by a block context record.
pub const BLOCK_CONTEXT_STACK_ALLOCATION: usize = 1;

/// Stack slots occupied by a `with` context record.
pub const WITH_CONTEXT_STACK_ALLOCATION: usize = 1;

/// Stack slots occupied by a try/catch/finally context record. The second
/// slot stashes the pending value of a finally: a return value, a thrown
/// value or a jump target.
pub const TRY_CONTEXT_STACK_ALLOCATION: usize = 2;

/// Stack slots occupied by a for-in context record: record word, name
/// collection, cursor, enumerated object.
pub const FOR_IN_CONTEXT_STACK_ALLOCATION: usize = 4;

/// Stack slots occupied by a for-of context record: record word, next
/// value, iterator.
pub const FOR_OF_CONTEXT_STACK_ALLOCATION: usize = 3;

/* HOST INTERACTION */

/// Backward branches executed between two consultations of the host
/// stop-hook.
#[cfg(feature = "vm-exec-stop")]
pub const EXEC_STOP_DEFAULT_FREQUENCY: u32 = 4096;

/// Row count of the direct-mapped property lookup cache.
#[cfg(feature = "lookup-cache")]
pub const LOOKUP_CACHE_SIZE: usize = 256;
