//! Deterministic Ken-Burns motion vectors.
//!
//! Every scene pans in one of eight directions. The direction is a pure
//! function of the scene id so that re-running a pipeline reproduces the
//! exact same output; no wall-clock randomness is involved anywhere.

use serde::{Deserialize, Serialize};

/// A pan direction as an integer unit vector.
///
/// `dx`/`dy` are each -1, 0 or 1 and never both zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Direction {
    pub dx: i8,
    pub dy: i8,
}

/// The eight supported motion vectors: four cardinal, four diagonal.
///
/// Index order is part of the seeding contract; changing it changes which
/// scene gets which motion.
pub const DIRECTIONS: [Direction; 8] = [
    Direction { dx: 1, dy: 0 },
    Direction { dx: 1, dy: 1 },
    Direction { dx: 0, dy: 1 },
    Direction { dx: -1, dy: 1 },
    Direction { dx: -1, dy: 0 },
    Direction { dx: -1, dy: -1 },
    Direction { dx: 0, dy: -1 },
    Direction { dx: 1, dy: -1 },
];

impl Direction {
    /// Select the motion vector for a scene id.
    ///
    /// Uses FNV-1a over the id bytes; the hash function is fixed and the
    /// mapping `id -> direction` is a stable contract.
    pub fn for_scene(scene_id: &str) -> Direction {
        DIRECTIONS[(fnv1a(scene_id.as_bytes()) % 8) as usize]
    }

    /// True when the vector has a horizontal component.
    pub fn moves_x(&self) -> bool {
        self.dx != 0
    }

    /// True when the vector has a vertical component.
    pub fn moves_y(&self) -> bool {
        self.dy != 0
    }
}

/// 64-bit FNV-1a. Kept private so the only public contract is
/// [`Direction::for_scene`].
pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x1000_0000_01b3;
    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
