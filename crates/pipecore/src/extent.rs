//! Structured extents and piece requests.

use crate::info::{InfoValue, Information};
use crate::keys::streaming;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inclusive index bounds `[xmin, xmax, ymin, ymax, zmin, zmax]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent(pub [i64; 6]);

impl Extent {
    pub const fn new(x0: i64, x1: i64, y0: i64, y1: i64, z0: i64, z1: i64) -> Self {
        Extent([x0, x1, y0, y1, z0, z1])
    }

    /// The canonical empty extent.
    pub const fn empty() -> Self {
        Extent([0, -1, 0, -1, 0, -1])
    }

    pub fn from_slice(values: &[i64]) -> Option<Self> {
        let values: [i64; 6] = values.try_into().ok()?;
        Some(Extent(values))
    }

    /// Read an extent stored under `key`, if present and well-formed.
    pub fn from_info(info: &Information, key: crate::Key) -> Option<Self> {
        info.get_integer_vector(key).and_then(Self::from_slice)
    }

    pub fn to_vec(&self) -> Vec<i64> {
        self.0.to_vec()
    }

    pub fn min(&self, axis: usize) -> i64 {
        self.0[axis * 2]
    }

    pub fn max(&self, axis: usize) -> i64 {
        self.0[axis * 2 + 1]
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.max(axis) < self.min(axis))
    }

    pub fn contains(&self, other: &Extent) -> bool {
        if other.is_empty() {
            return true;
        }
        (0..3).all(|axis| self.min(axis) <= other.min(axis) && other.max(axis) <= self.max(axis))
    }

    pub fn intersect(&self, other: &Extent) -> Extent {
        let mut out = [0; 6];
        for axis in 0..3 {
            out[axis * 2] = self.min(axis).max(other.min(axis));
            out[axis * 2 + 1] = self.max(axis).min(other.max(axis));
        }
        Extent(out)
    }

    /// Smallest extent covering both; an empty side contributes nothing.
    pub fn union(&self, other: &Extent) -> Extent {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let mut out = [0; 6];
        for axis in 0..3 {
            out[axis * 2] = self.min(axis).min(other.min(axis));
            out[axis * 2 + 1] = self.max(axis).max(other.max(axis));
        }
        Extent(out)
    }

    /// Grow every axis by `halo` cells on both sides.
    pub fn pad(&self, halo: i64) -> Extent {
        let mut out = self.0;
        for axis in 0..3 {
            out[axis * 2] -= halo;
            out[axis * 2 + 1] += halo;
        }
        Extent(out)
    }

    /// Restrict to the bounds of `whole`.
    pub fn clamp_to(&self, whole: &Extent) -> Extent {
        self.intersect(whole)
    }

    pub fn dimensions(&self) -> [usize; 3] {
        let mut dims = [0; 3];
        for (axis, dim) in dims.iter_mut().enumerate() {
            *dim = (self.max(axis) - self.min(axis) + 1).max(0) as usize;
        }
        dims
    }

    pub fn number_of_points(&self) -> usize {
        self.dimensions().iter().product()
    }

    /// Linear x-fastest offset of `(i, j, k)` inside this extent.
    pub fn offset_of(&self, i: i64, j: i64, k: i64) -> Option<usize> {
        let point = [i, j, k];
        if (0..3).any(|axis| point[axis] < self.min(axis) || point[axis] > self.max(axis)) {
            return None;
        }
        let [nx, ny, _] = self.dimensions();
        let (di, dj, dk) = (
            (i - self.min(0)) as usize,
            (j - self.min(1)) as usize,
            (k - self.min(2)) as usize,
        );
        Some(di + nx * (dj + ny * dk))
    }

    /// Every `(i, j, k)` in x-fastest order.
    pub fn points(&self) -> impl Iterator<Item = (i64, i64, i64)> + '_ {
        let e = *self;
        (e.min(2)..=e.max(2)).flat_map(move |k| {
            (e.min(1)..=e.max(1))
                .flat_map(move |j| (e.min(0)..=e.max(0)).map(move |i| (i, j, k)))
        })
    }
}

impl From<Extent> for InfoValue {
    fn from(extent: Extent) -> Self {
        InfoValue::IntegerVector(extent.to_vec())
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        write!(f, "[{}]", parts.join(","))
    }
}

impl FromStr for Extent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .trim_matches(|c| c == '[' || c == ']')
            .split(',')
            .map(|part| part.trim().parse::<i64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid extent '{}': {}", s, e))?;
        Extent::from_slice(&values)
            .ok_or_else(|| format!("extent needs 6 integers, got {}", values.len()))
    }
}

/// How a producer describes the domain it can split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtentType {
    /// Six-integer structured extent.
    Structured,
    /// Piece / number-of-pieces / ghost-level request.
    Piece,
}

impl ExtentType {
    pub fn code(&self) -> i64 {
        match self {
            ExtentType::Piece => 0,
            ExtentType::Structured => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ExtentType::Piece),
            1 => Some(ExtentType::Structured),
            _ => None,
        }
    }
}

/// A piece-based update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceRequest {
    pub piece: i64,
    pub pieces: i64,
    pub ghost_levels: i64,
}

impl PieceRequest {
    pub fn new(piece: i64, pieces: i64, ghost_levels: i64) -> Self {
        Self {
            piece,
            pieces,
            ghost_levels,
        }
    }

    pub fn from_info(info: &Information) -> Option<Self> {
        Some(Self {
            piece: info.get_integer(streaming::update_piece_number())?,
            pieces: info.get_integer(streaming::update_number_of_pieces())?,
            ghost_levels: info
                .get_integer(streaming::update_number_of_ghost_levels())
                .unwrap_or(0),
        })
    }

    pub fn store(&self, info: &mut Information) {
        info.set(streaming::update_piece_number(), self.piece);
        info.set(streaming::update_number_of_pieces(), self.pieces);
        info.set(streaming::update_number_of_ghost_levels(), self.ghost_levels);
    }

    pub fn is_empty(&self) -> bool {
        self.pieces <= 0 || self.piece < 0 || self.piece >= self.pieces
    }

    /// Slab of `whole` along its longest axis assigned to this piece.
    pub fn to_extent(&self, whole: &Extent) -> Extent {
        if self.is_empty() || whole.is_empty() {
            return Extent::empty();
        }
        let dims = whole.dimensions();
        let axis = (0..3).max_by_key(|&a| (dims[a], std::cmp::Reverse(a))).unwrap_or(0);
        let len = dims[axis] as i64;
        let pieces = self.pieces.min(len).max(1);
        if self.piece >= pieces {
            return Extent::empty();
        }
        let start = whole.min(axis) + len * self.piece / pieces;
        let end = whole.min(axis) + len * (self.piece + 1) / pieces - 1;
        let mut out = whole.0;
        out[axis * 2] = (start - self.ghost_levels).max(whole.min(axis));
        out[axis * 2 + 1] = (end + self.ghost_levels).min(whole.max(axis));
        Extent(out)
    }
}

/// Whether the update request stored in `info` asks for nothing.
///
/// A missing structured extent counts as empty, as does a piece request with
/// no pieces or a piece index outside `[0, pieces)`.
pub fn update_extent_is_empty(info: &Information, extent_type: ExtentType) -> bool {
    match extent_type {
        ExtentType::Structured => Extent::from_info(info, streaming::update_extent())
            .map(|e| e.is_empty())
            .unwrap_or(true),
        ExtentType::Piece => PieceRequest::from_info(info)
            .map(|p| p.is_empty())
            .unwrap_or(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_then_clamp() {
        let whole = Extent::new(0, 9, 0, 0, 0, 0);
        let request = Extent::new(2, 8, 0, 0, 0, 0);
        assert_eq!(request.pad(1).clamp_to(&whole), Extent::new(1, 9, 0, 0, 0, 0));
        assert_eq!(
            Extent::new(0, 9, 0, 0, 0, 0).pad(1).clamp_to(&whole),
            whole
        );
    }

    #[test]
    fn test_empty_and_contains() {
        assert!(Extent::empty().is_empty());
        let whole = Extent::new(0, 9, 0, 9, 0, 0);
        assert!(whole.contains(&Extent::new(2, 5, 2, 5, 0, 0)));
        assert!(!whole.contains(&Extent::new(2, 10, 2, 5, 0, 0)));
        assert_eq!(whole.number_of_points(), 100);
    }

    #[test]
    fn test_union_covers_both_sides() {
        let a = Extent::new(1, 6, 1, 6, 0, 0);
        let b = Extent::new(2, 8, 0, 3, 0, 0);
        assert_eq!(a.union(&b), Extent::new(1, 8, 0, 6, 0, 0));
        assert_eq!(Extent::empty().union(&b), b);
        assert_eq!(a.union(&Extent::empty()), a);
    }

    #[test]
    fn test_offsets_are_x_fastest() {
        let e = Extent::new(1, 3, 1, 2, 0, 0);
        assert_eq!(e.offset_of(1, 1, 0), Some(0));
        assert_eq!(e.offset_of(3, 1, 0), Some(2));
        assert_eq!(e.offset_of(1, 2, 0), Some(3));
        assert_eq!(e.offset_of(0, 1, 0), None);
        assert_eq!(e.points().count(), 6);
    }

    #[test]
    fn test_parse() {
        let e: Extent = "2,5,2,5,0,0".parse().unwrap();
        assert_eq!(e, Extent::new(2, 5, 2, 5, 0, 0));
        assert!("1,2,3".parse::<Extent>().is_err());
        assert_eq!(e.to_string().parse::<Extent>().unwrap(), e);
    }

    #[test]
    fn test_update_extent_is_empty() {
        let mut info = Information::new();
        assert!(update_extent_is_empty(&info, ExtentType::Structured));
        info.set(streaming::update_extent(), Extent::new(0, 4, 0, 0, 0, 0));
        assert!(!update_extent_is_empty(&info, ExtentType::Structured));
        info.set(streaming::update_extent(), Extent::empty());
        assert!(update_extent_is_empty(&info, ExtentType::Structured));

        assert!(update_extent_is_empty(&info, ExtentType::Piece));
        PieceRequest::new(0, 2, 0).store(&mut info);
        assert!(!update_extent_is_empty(&info, ExtentType::Piece));
        PieceRequest::new(2, 2, 0).store(&mut info);
        assert!(update_extent_is_empty(&info, ExtentType::Piece));
    }

    #[test]
    fn test_piece_to_extent_splits_longest_axis() {
        let whole = Extent::new(0, 9, 0, 3, 0, 0);
        assert_eq!(
            PieceRequest::new(0, 2, 0).to_extent(&whole),
            Extent::new(0, 4, 0, 3, 0, 0)
        );
        assert_eq!(
            PieceRequest::new(1, 2, 1).to_extent(&whole),
            Extent::new(4, 9, 0, 3, 0, 0)
        );
    }
}
