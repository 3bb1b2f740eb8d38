//! Rectangle sets in y-x banded form
//!
//! A [`Region`] is a union of disjoint half-open boxes kept in canonical
//! banded order: rectangles are sorted by band (top edge), rectangles inside a
//! band share `y1`/`y2` and are sorted by `x1`, horizontally adjacent spans are
//! merged, and vertically adjacent bands with identical spans are merged.
//! Two regions covering the same pixels therefore have the same rectangle
//! list, so [`Region::len`] is a stable input for transfer fan-out decisions.

const fn clamp_extent(v: u32) -> i32 {
    if v > i32::MAX as u32 {
        i32::MAX
    } else {
        v as i32
    }
}

/// Half-open box `[x1, x2) × [y1, y2)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box with origin `(x, y)` and the given size
    ///
    /// Far edges saturate at `i32::MAX`.
    pub const fn from_size(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x1: x,
            y1: y,
            x2: x.saturating_add(clamp_extent(width)),
            y2: y.saturating_add(clamp_extent(height)),
        }
    }

    /// [`Rect::from_size`] for unsigned device coordinates
    pub fn from_unsigned(x: u32, y: u32, width: u32, height: u32) -> Self {
        let coord = |v: u32| i32::try_from(v).unwrap_or(i32::MAX);
        Self::from_size(coord(x), coord(y), width, height)
    }

    pub const fn width(&self) -> u32 {
        if self.x2 > self.x1 {
            (self.x2 - self.x1) as u32
        } else {
            0
        }
    }

    pub const fn height(&self) -> u32 {
        if self.y2 > self.y1 {
            (self.y2 - self.y1) as u32
        } else {
            0
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        };
        (!r.is_empty()).then_some(r)
    }

    /// Smallest box containing both
    pub fn bounds(&self, other: &Rect) -> Rect {
        Rect {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Union,
    Subtract,
    Intersect,
}

impl Op {
    fn keep(self, in_a: bool, in_b: bool) -> bool {
        match self {
            Op::Union => in_a || in_b,
            Op::Subtract => in_a && !in_b,
            Op::Intersect => in_a && in_b,
        }
    }
}

/// Union of disjoint boxes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    rects: Vec<Rect>,
    extents: Rect,
}

impl Region {
    pub const fn new() -> Self {
        Self {
            rects: Vec::new(),
            extents: Rect::new(0, 0, 0, 0),
        }
    }

    pub fn from_rect(rect: Rect) -> Self {
        if rect.is_empty() {
            return Self::new();
        }
        Self {
            rects: vec![rect],
            extents: rect,
        }
    }

    /// Union of arbitrary, possibly overlapping, boxes
    ///
    /// Built in one sweep over the sorted input.
    pub fn from_rects<I: IntoIterator<Item = Rect>>(rects: I) -> Self {
        let mut rects: Vec<Rect> = rects.into_iter().filter(|r| !r.is_empty()).collect();
        if rects.len() < 2 {
            return rects.pop().map_or_else(Self::new, Self::from_rect);
        }
        rects.sort_unstable_by_key(|r| r.y1);

        let mut builder = BandBuilder::default();
        let mut active: Vec<Rect> = Vec::new();
        let mut next = 0;
        for w in band_edges(rects.iter()).windows(2) {
            let (y1, y2) = (w[0], w[1]);
            active.retain(|r| r.y2 > y1);
            while next < rects.len() && rects[next].y1 <= y1 {
                active.push(rects[next]);
                next += 1;
            }

            let mut spans: Vec<(i32, i32)> = active.iter().map(|r| (r.x1, r.x2)).collect();
            spans.sort_unstable();
            let mut merged: Vec<(i32, i32)> = Vec::with_capacity(spans.len());
            for (x1, x2) in spans {
                match merged.last_mut() {
                    Some(last) if x1 <= last.1 => last.1 = last.1.max(x2),
                    _ => merged.push((x1, x2)),
                }
            }
            builder.push(y1, y2, merged);
        }
        builder.finish()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Number of boxes in canonical form
    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Bounding box; all zero for an empty region
    pub fn extents(&self) -> Rect {
        self.extents
    }

    pub fn area(&self) -> u64 {
        self.rects.iter().map(Rect::area).sum()
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.extents.contains(x, y) && self.rects.iter().any(|r| r.contains(x, y))
    }

    pub fn clear(&mut self) {
        self.rects.clear();
        self.extents = Rect::default();
    }

    pub fn union(&self, other: &Region) -> Region {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        combine(self, other, Op::Union)
    }

    pub fn subtract(&self, other: &Region) -> Region {
        if self.is_empty() || other.is_empty() || self.extents.intersect(&other.extents).is_none()
        {
            return self.clone();
        }
        combine(self, other, Op::Subtract)
    }

    pub fn intersect(&self, other: &Region) -> Region {
        if self.is_empty() || other.is_empty() || self.extents.intersect(&other.extents).is_none()
        {
            return Region::new();
        }
        combine(self, other, Op::Intersect)
    }

    pub fn union_rect(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        *self = self.union(&Region::from_rect(rect));
    }

    /// Restrict to `bounds`
    pub fn clip(&self, bounds: Rect) -> Region {
        self.intersect(&Region::from_rect(bounds))
    }

    fn from_canonical(rects: Vec<Rect>) -> Self {
        let extents = rects
            .iter()
            .copied()
            .reduce(|acc, r| acc.bounds(&r))
            .unwrap_or_default();
        Self { rects, extents }
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Region::from_rect(rect)
    }
}

/// Sorted, deduplicated top and bottom edges of `rects`
fn band_edges<'a>(rects: impl Iterator<Item = &'a Rect>) -> Vec<i32> {
    let mut ys: Vec<i32> = rects.flat_map(|r| [r.y1, r.y2]).collect();
    ys.sort_unstable();
    ys.dedup();
    ys
}

/// Forward-only walk over the bands of a canonical rect list
struct Bands<'a> {
    rects: &'a [Rect],
    pos: usize,
}

impl<'a> Bands<'a> {
    fn new(region: &'a Region) -> Self {
        Self {
            rects: &region.rects,
            pos: 0,
        }
    }

    /// Spans of the band containing row `y`; `y` must not decrease
    fn at(&mut self, y: i32) -> &'a [Rect] {
        let rects = self.rects;
        while self.pos < rects.len() && rects[self.pos].y2 <= y {
            self.pos += 1;
        }
        match rects.get(self.pos) {
            Some(first) if first.y1 <= y => {
                let len = rects[self.pos..]
                    .iter()
                    .take_while(|r| r.y1 == first.y1)
                    .count();
                &rects[self.pos..self.pos + len]
            }
            _ => &[],
        }
    }
}

/// Collects bands top to bottom, merging vertically adjacent equal bands
#[derive(Default)]
struct BandBuilder {
    out: Vec<Rect>,
    /// (bottom edge, first index in `out`) of the last emitted band
    prev: Option<(i32, usize)>,
}

impl BandBuilder {
    fn push(&mut self, y1: i32, y2: i32, spans: Vec<(i32, i32)>) {
        if spans.is_empty() {
            self.prev = None;
            return;
        }

        if let Some((prev_y2, start)) = self.prev {
            let prev = &self.out[start..];
            let same = prev_y2 == y1
                && prev.len() == spans.len()
                && prev
                    .iter()
                    .zip(spans.iter())
                    .all(|(r, &(x1, x2))| r.x1 == x1 && r.x2 == x2);
            if same {
                for r in &mut self.out[start..] {
                    r.y2 = y2;
                }
                self.prev = Some((y2, start));
                return;
            }
        }

        let start = self.out.len();
        self.out
            .extend(spans.into_iter().map(|(x1, x2)| Rect { x1, y1, x2, y2 }));
        self.prev = Some((y2, start));
    }

    fn finish(self) -> Region {
        Region::from_canonical(self.out)
    }
}

/// Apply `op` to two sorted, disjoint span lists
fn combine_spans(a: &[Rect], b: &[Rect], op: Op) -> Vec<(i32, i32)> {
    let mut xs: Vec<i32> = a
        .iter()
        .chain(b.iter())
        .flat_map(|r| [r.x1, r.x2])
        .collect();
    xs.sort_unstable();
    xs.dedup();

    let (mut ia, mut ib) = (0, 0);
    let mut out: Vec<(i32, i32)> = Vec::new();
    for w in xs.windows(2) {
        let (x1, x2) = (w[0], w[1]);
        while ia < a.len() && a[ia].x2 <= x1 {
            ia += 1;
        }
        while ib < b.len() && b[ib].x2 <= x1 {
            ib += 1;
        }
        let in_a = a.get(ia).is_some_and(|r| r.x1 <= x1);
        let in_b = b.get(ib).is_some_and(|r| r.x1 <= x1);
        if !op.keep(in_a, in_b) {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.1 == x1 => last.1 = x2,
            _ => out.push((x1, x2)),
        }
    }
    out
}

fn combine(a: &Region, b: &Region, op: Op) -> Region {
    let (mut bands_a, mut bands_b) = (Bands::new(a), Bands::new(b));
    let mut builder = BandBuilder::default();

    for w in band_edges(a.rects.iter().chain(b.rects.iter())).windows(2) {
        let (y1, y2) = (w[0], w[1]);
        let spans = combine_spans(bands_a.at(y1), bands_b.at(y1), op);
        builder.push(y1, y2, spans);
    }

    builder.finish()
}
