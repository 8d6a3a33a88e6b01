//! Crossover location between the band middle and the long average.
//!
//! A crossover sits between two adjacent points whose spreads
//! (middle - long) change sign. The reported price is where the two
//! straight segments joining those points intersect.

use tracing::debug;

use common::{CrossoverEvent, Direction, IndicatorPoint};

/// Iterator over crossovers of one direction, newest first.
#[derive(Debug, Clone)]
pub struct Crossovers<'a> {
    points: &'a [IndicatorPoint],
    direction: Direction,
    /// Index of the next later-bracketing point to test.
    cursor: usize,
    /// Lowest index the cursor may test (always >= 1).
    floor: usize,
}

impl<'a> Crossovers<'a> {
    /// Restrict the scan to crossovers at most `depth - 1` bars ago.
    pub fn within(mut self, depth: usize) -> Self {
        self.floor = self.points.len().saturating_sub(depth).max(1);
        self
    }
}

impl Iterator for Crossovers<'_> {
    type Item = CrossoverEvent;

    fn next(&mut self) -> Option<CrossoverEvent> {
        while self.cursor >= self.floor && self.cursor > 0 {
            let i = self.cursor;
            self.cursor -= 1;
            if let Some(event) = cross_at(self.points, i, self.direction) {
                return Some(event);
            }
        }
        None
    }
}

/// Every crossover of `direction` in `points`, newest first.
pub fn crossovers(points: &[IndicatorPoint], direction: Direction) -> Crossovers<'_> {
    Crossovers {
        points,
        direction,
        cursor: points.len().saturating_sub(1),
        floor: 1,
    }
}

/// Most recent crossover of `direction` within `depth` bars, if any.
pub fn locate_cross(
    points: &[IndicatorPoint],
    direction: Direction,
    depth: usize,
) -> Option<CrossoverEvent> {
    crossovers(points, direction).within(depth).next()
}

/// Trend side of a point; `None` when middle and long are equal within
/// `tolerance` relative to the long average.
pub fn trend_at(point: &IndicatorPoint, tolerance: f64) -> Option<Direction> {
    let spread = point.spread();
    if spread.abs() <= tolerance * point.long_avg.abs() {
        None
    } else if spread > 0.0 {
        Some(Direction::Upward)
    } else {
        Some(Direction::Downward)
    }
}

fn cross_at(points: &[IndicatorPoint], i: usize, direction: Direction) -> Option<CrossoverEvent> {
    let prev = &points[i - 1];
    let curr = &points[i];
    let (d0, d1) = (prev.spread(), curr.spread());

    let crossed = match direction {
        Direction::Upward => d0 <= 0.0 && d1 > 0.0,
        Direction::Downward => d0 >= 0.0 && d1 < 0.0,
    };
    if !crossed {
        return None;
    }

    Some(CrossoverEvent {
        direction,
        bars_ago: points.len() - 1 - i,
        index: i,
        timestamp: curr.timestamp,
        price: interpolate(prev, curr),
    })
}

/// Price at which the middle and long segments between `prev` and `curr` meet.
fn interpolate(prev: &IndicatorPoint, curr: &IndicatorPoint) -> f64 {
    let (d0, d1) = (prev.spread(), curr.spread());
    let denom = d0 - d1;
    if denom == 0.0 {
        debug!(
            timestamp = %curr.timestamp,
            "Parallel indicator segments, using current band middle"
        );
        return curr.band_middle;
    }
    let t = d0 / denom;
    prev.band_middle + (curr.band_middle - prev.band_middle) * t
}
