//! Hilbert curve over an N×N grid, plus the fixed bucketing that folds the
//! 32-bit address space onto the curve.

use thiserror::Error;

use crate::address::Address;

/// Largest supported grid side. 65536² indices cover every IPv4 address
/// with a bucket shift of zero.
pub const MAX_ORDER: u32 = 1 << 16;

/// Largest bucket shift; at 32 every address falls into cell 0.
pub const MAX_SHIFT: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CurveError {
    #[error("curve order {order} is not a power of two in 1..={max}", max = MAX_ORDER)]
    InvalidOrder { order: u32 },

    #[error("curve index {index} outside 0..{len}")]
    IndexOutOfRange { index: u64, len: u64 },

    #[error("coordinate ({x}, {y}) outside a {order}x{order} grid")]
    CoordinateOutOfRange { x: u32, y: u32, order: u32 },

    #[error("bucket shift {shift} is larger than {max}", max = MAX_SHIFT)]
    InvalidShift { shift: u32 },
}

/// A cell of the grid, `0 <= x, y < order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridCoordinate {
    pub x: u32,
    pub y: u32,
}

/// Bijection between curve indices in `[0, order²)` and grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurveMapper {
    order: u32,
}

impl CurveMapper {
    pub fn new(order: u32) -> Result<Self, CurveError> {
        if order == 0 || order > MAX_ORDER || !order.is_power_of_two() {
            return Err(CurveError::InvalidOrder { order });
        }
        Ok(Self { order })
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    /// Number of cells, `order²`.
    pub fn cell_count(&self) -> u64 {
        u64::from(self.order) * u64::from(self.order)
    }

    pub fn index_to_coordinate(&self, index: u64) -> Result<GridCoordinate, CurveError> {
        if index >= self.cell_count() {
            return Err(CurveError::IndexOutOfRange {
                index,
                len: self.cell_count(),
            });
        }

        let (mut x, mut y) = (0u64, 0u64);
        let mut t = index;
        let mut s = 1u64;
        while s < u64::from(self.order) {
            let rx = 1 & (t / 2);
            let ry = 1 & (t ^ rx);
            rotate(s, &mut x, &mut y, rx, ry);
            x += s * rx;
            y += s * ry;
            t /= 4;
            s *= 2;
        }

        // x, y < order <= 2^16
        Ok(GridCoordinate {
            x: x as u32,
            y: y as u32,
        })
    }

    pub fn coordinate_to_index(&self, coord: GridCoordinate) -> Result<u64, CurveError> {
        if coord.x >= self.order || coord.y >= self.order {
            return Err(CurveError::CoordinateOutOfRange {
                x: coord.x,
                y: coord.y,
                order: self.order,
            });
        }

        let n = u64::from(self.order);
        let (mut x, mut y) = (u64::from(coord.x), u64::from(coord.y));
        let mut index = 0u64;
        let mut s = n / 2;
        while s > 0 {
            let rx = u64::from((x & s) > 0);
            let ry = u64::from((y & s) > 0);
            index += s * s * ((3 * rx) ^ ry);
            rotate(n, &mut x, &mut y, rx, ry);
            s /= 2;
        }
        Ok(index)
    }
}

fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n - 1 - *x;
            *y = n - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}

/// Places addresses on the curve by dropping their low `shift` bits, so each
/// pixel stands for a block of `2^shift` consecutive addresses.
///
/// The reverse direction is lossy on purpose: [`AddressMapper::lookup`]
/// returns the smallest address of the block under a pixel, never the
/// address that was actually painted there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressMapper {
    curve: CurveMapper,
    shift: u32,
}

impl AddressMapper {
    pub fn new(curve: CurveMapper, shift: u32) -> Result<Self, CurveError> {
        if shift > MAX_SHIFT {
            return Err(CurveError::InvalidShift { shift });
        }
        Ok(Self { curve, shift })
    }

    pub fn curve(&self) -> &CurveMapper {
        &self.curve
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    /// True when every address lands inside the grid.
    pub fn covers_address_space(&self) -> bool {
        self.bucket(Address::new(u32::MAX)) < self.curve.cell_count()
    }

    pub fn bucket(&self, address: Address) -> u64 {
        u64::from(address.to_u32()) >> self.shift
    }

    pub fn locate(&self, address: Address) -> Result<GridCoordinate, CurveError> {
        self.curve.index_to_coordinate(self.bucket(address))
    }

    /// Representative address for a pixel. Anything outside the grid, or a
    /// cell whose block lies past the end of the address space, gives 0.
    pub fn lookup(&self, x: i64, y: i64) -> Address {
        let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
            return Address::UNSPECIFIED;
        };
        self.curve
            .coordinate_to_index(GridCoordinate { x, y })
            .ok()
            .and_then(|index| index.checked_shl(self.shift))
            .and_then(|first| u32::try_from(first).ok())
            .map(Address::new)
            .unwrap_or(Address::UNSPECIFIED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two_orders() {
        for order in [0, 3, 6, 1000, 1025, MAX_ORDER * 2] {
            assert_eq!(
                CurveMapper::new(order),
                Err(CurveError::InvalidOrder { order })
            );
        }
        for order in [1, 2, 64, 1024, 4096, MAX_ORDER] {
            assert!(CurveMapper::new(order).is_ok());
        }
    }

    #[test]
    fn order_two_walks_the_u_shape() {
        let curve = CurveMapper::new(2).unwrap();
        let walk: Vec<_> = (0..4)
            .map(|i| {
                let c = curve.index_to_coordinate(i).unwrap();
                (c.x, c.y)
            })
            .collect();
        assert_eq!(walk, vec![(0, 0), (0, 1), (1, 1), (1, 0)]);
    }

    #[test]
    fn index_round_trips_for_every_cell() {
        for order in [1, 2, 4, 8, 16, 32, 64] {
            let curve = CurveMapper::new(order).unwrap();
            for i in 0..curve.cell_count() {
                let coord = curve.index_to_coordinate(i).unwrap();
                assert!(coord.x < order && coord.y < order);
                assert_eq!(curve.coordinate_to_index(coord).unwrap(), i);
            }
        }
    }

    #[test]
    fn large_order_round_trips_sampled_indices() {
        let curve = CurveMapper::new(4096).unwrap();
        for i in (0..curve.cell_count()).step_by(7919) {
            let coord = curve.index_to_coordinate(i).unwrap();
            assert_eq!(curve.coordinate_to_index(coord).unwrap(), i);
        }
        let last = curve.cell_count() - 1;
        let coord = curve.index_to_coordinate(last).unwrap();
        assert_eq!(curve.coordinate_to_index(coord).unwrap(), last);
    }

    #[test]
    fn consecutive_indices_are_grid_neighbours() {
        let curve = CurveMapper::new(16).unwrap();
        for i in 1..curve.cell_count() {
            let a = curve.index_to_coordinate(i - 1).unwrap();
            let b = curve.index_to_coordinate(i).unwrap();
            assert_eq!(a.x.abs_diff(b.x) + a.y.abs_diff(b.y), 1, "step {i}");
        }
    }

    #[test]
    fn out_of_range_index_fails() {
        let curve = CurveMapper::new(8).unwrap();
        assert_eq!(
            curve.index_to_coordinate(64),
            Err(CurveError::IndexOutOfRange { index: 64, len: 64 })
        );
        assert!(curve.index_to_coordinate(u64::MAX).is_err());
    }

    #[test]
    fn out_of_range_coordinate_fails() {
        let curve = CurveMapper::new(8).unwrap();
        for (x, y) in [(8, 0), (0, 8), (8, 8), (u32::MAX, 3)] {
            assert_eq!(
                curve.coordinate_to_index(GridCoordinate { x, y }),
                Err(CurveError::CoordinateOutOfRange { x, y, order: 8 })
            );
        }
    }

    #[test]
    fn default_layout_covers_every_address() {
        let mapper = AddressMapper::new(CurveMapper::new(1024).unwrap(), 12).unwrap();
        assert!(mapper.covers_address_space());
        assert!(mapper.locate(Address::new(u32::MAX)).is_ok());
    }

    #[test]
    fn small_grid_drops_high_addresses() {
        let mapper = AddressMapper::new(CurveMapper::new(16).unwrap(), 12).unwrap();
        assert!(!mapper.covers_address_space());
        assert!(mapper.locate(Address::new(0x0000_0FFF)).is_ok());
        assert!(matches!(
            mapper.locate("10.0.0.1".parse().unwrap()),
            Err(CurveError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_shift_beyond_address_width() {
        let curve = CurveMapper::new(16).unwrap();
        assert_eq!(
            AddressMapper::new(curve, 33),
            Err(CurveError::InvalidShift { shift: 33 })
        );
        assert!(AddressMapper::new(curve, u32::MAX).is_err());

        let widest = AddressMapper::new(curve, MAX_SHIFT).unwrap();
        assert_eq!(widest.bucket(Address::new(u32::MAX)), 0);
    }

    #[test]
    fn lookup_returns_first_address_of_bucket() {
        let mapper = AddressMapper::new(CurveMapper::new(1024).unwrap(), 12).unwrap();
        let original: Address = "192.168.37.201".parse().unwrap();
        let coord = mapper.locate(original).unwrap();
        let representative = mapper.lookup(i64::from(coord.x), i64::from(coord.y));

        assert_eq!(representative.to_string(), "192.168.32.0");
        assert_ne!(representative, original);
        assert_eq!(mapper.locate(representative).unwrap(), coord);
    }

    #[test]
    fn lookup_outside_grid_is_zero() {
        let mapper = AddressMapper::new(CurveMapper::new(1024).unwrap(), 12).unwrap();
        for (x, y) in [(-1, 0), (0, -1), (1024, 0), (0, 1024), (i64::MAX, i64::MIN)] {
            assert_eq!(mapper.lookup(x, y), Address::UNSPECIFIED);
        }
    }

    #[test]
    fn lookup_past_address_space_is_zero() {
        // 4096² cells at shift 12 reach far beyond 2^32.
        let mapper = AddressMapper::new(CurveMapper::new(4096).unwrap(), 12).unwrap();
        let curve = mapper.curve();
        let coord = curve.index_to_coordinate(curve.cell_count() - 1).unwrap();
        assert_eq!(
            mapper.lookup(i64::from(coord.x), i64::from(coord.y)),
            Address::UNSPECIFIED
        );
    }
}
