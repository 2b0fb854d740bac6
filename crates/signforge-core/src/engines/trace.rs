//! Built-in vectorization: median-cut quantization plus span tracing.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;

use signforge_critics::{RasterImage, Region, Span, VectorImage};

use super::{EngineError, VectorizationEngine};

/// Weighted color histogram entry: (rgb, pixel count).
type WeightedColor = ([u8; 3], u32);

/// Deterministic tracer: median-cut palette, border-majority background,
/// row spans per palette color.
///
/// Complexity is capped on the number of 4-connected foreground shapes
/// (the span-level analogue of a vector path); a trace above the cap fails
/// rather than flooding the extruder.
pub struct PaletteTracer {
    max_regions: usize,
}

impl PaletteTracer {
    pub fn new(max_regions: usize) -> Self {
        Self { max_regions }
    }

    fn trace(&self, image: &RasterImage, palette_size: usize) -> Result<VectorImage, EngineError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidInput("image canvas is empty".into()));
        }
        if palette_size < 2 {
            return Err(EngineError::InvalidInput(format!(
                "palette size {palette_size} below minimum 2"
            )));
        }

        // Weighted histogram, sorted for a deterministic cut order.
        let mut histogram: HashMap<[u8; 3], u32> = HashMap::new();
        for pixel in image.pixels().pixels() {
            let [r, g, b, _] = pixel.0;
            *histogram.entry([r, g, b]).or_insert(0) += 1;
        }
        let mut colors: Vec<WeightedColor> = histogram.into_iter().collect();
        colors.sort_unstable_by_key(|(color, _)| *color);

        let boxes = median_cut(colors, palette_size);

        // Box mean per source color; distinct boxes can collapse to one mean.
        let mut palette: Vec<[u8; 3]> = Vec::new();
        let mut mapping: HashMap<[u8; 3], [u8; 3]> = HashMap::new();
        for cut in &boxes {
            let mean = box_color(cut);
            if !palette.contains(&mean) {
                palette.push(mean);
            }
            for (color, _) in cut {
                mapping.insert(*color, mean);
            }
        }

        let quantized = |x: u32, y: u32| -> [u8; 3] {
            let [r, g, b, _] = image.pixels().get_pixel(x, y).0;
            mapping.get(&[r, g, b]).copied().unwrap_or([r, g, b])
        };

        let background = border_majority(&quantized, width, height);

        // Row spans for every non-background color.
        let mut spans_by_color: HashMap<[u8; 3], Vec<Span>> = HashMap::new();
        for y in 0..height {
            let mut x = 0u32;
            while x < width {
                let color = quantized(x, y);
                let x0 = x;
                while x < width && quantized(x, y) == color {
                    x += 1;
                }
                if color != background {
                    spans_by_color
                        .entry(color)
                        .or_default()
                        .push(Span { y, x0, x1: x });
                }
            }
        }

        let mut regions = Vec::new();
        for color in &palette {
            if *color == background {
                continue;
            }
            if let Some(spans) = spans_by_color.remove(color) {
                regions.push(Region {
                    color: *color,
                    spans,
                });
            }
        }

        let shapes: usize = regions.iter().map(|r| component_count(&r.spans)).sum();
        if shapes > self.max_regions {
            return Err(EngineError::InvalidInput(format!(
                "trace produced {shapes} shapes, cap is {}",
                self.max_regions
            )));
        }

        let vector = VectorImage {
            width,
            height,
            palette,
            background,
            regions,
        };
        tracing::debug!(
            colors = vector.palette.len(),
            regions = vector.region_count(),
            spans = vector.span_count(),
            shapes,
            coverage = vector.coverage(),
            "trace complete"
        );
        Ok(vector)
    }
}

impl Default for PaletteTracer {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl VectorizationEngine for PaletteTracer {
    async fn vectorize(
        &self,
        image: &RasterImage,
        palette_size: usize,
    ) -> Result<VectorImage, EngineError> {
        self.trace(image, palette_size)
    }
}

/// Split the weighted color set into at most `palette_size` boxes, always
/// cutting the box with the widest channel range at its weighted median.
fn median_cut(colors: Vec<WeightedColor>, palette_size: usize) -> Vec<Vec<WeightedColor>> {
    let mut boxes = vec![colors];
    while boxes.len() < palette_size {
        let Some((index, channel)) = widest_box(&boxes) else {
            break;
        };
        let mut chosen = boxes.remove(index);
        chosen.sort_unstable_by_key(|(color, _)| (color[channel], *color));
        let split = weighted_median(&chosen);
        let right = chosen.split_off(split);
        boxes.push(chosen);
        boxes.push(right);
    }
    boxes
}

/// Box and channel with the largest value range; `None` when every box
/// holds a single distinct color.
fn widest_box(boxes: &[Vec<WeightedColor>]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, u8)> = None;
    for (index, cut) in boxes.iter().enumerate() {
        if cut.len() < 2 {
            continue;
        }
        for channel in 0..3 {
            let lo = cut.iter().map(|(c, _)| c[channel]).min().unwrap_or(0);
            let hi = cut.iter().map(|(c, _)| c[channel]).max().unwrap_or(0);
            let range = hi - lo;
            if range > 0 && best.map_or(true, |(_, _, r)| range > r) {
                best = Some((index, channel, range));
            }
        }
    }
    best.map(|(index, channel, _)| (index, channel))
}

/// Split index at the weighted median, keeping both halves non-empty.
fn weighted_median(colors: &[WeightedColor]) -> usize {
    let total: u64 = colors.iter().map(|(_, n)| *n as u64).sum();
    let mut acc = 0u64;
    for (i, (_, n)) in colors.iter().enumerate() {
        acc += *n as u64;
        if acc * 2 >= total {
            return (i + 1).clamp(1, colors.len().saturating_sub(1).max(1));
        }
    }
    1
}

/// Weighted mean color of one box, rounded per channel.
fn box_color(colors: &[WeightedColor]) -> [u8; 3] {
    let mut sums = [0u64; 3];
    let mut weight = 0u64;
    for (color, n) in colors {
        for channel in 0..3 {
            sums[channel] += color[channel] as u64 * *n as u64;
        }
        weight += *n as u64;
    }
    if weight == 0 {
        return [0, 0, 0];
    }
    let mut mean = [0u8; 3];
    for channel in 0..3 {
        mean[channel] = ((sums[channel] + weight / 2) / weight) as u8;
    }
    mean
}

/// Most frequent quantized color along the canvas border.
fn border_majority(quantized: &dyn Fn(u32, u32) -> [u8; 3], width: u32, height: u32) -> [u8; 3] {
    let mut counts: BTreeMap<[u8; 3], u64> = BTreeMap::new();
    for x in 0..width {
        *counts.entry(quantized(x, 0)).or_insert(0) += 1;
        if height > 1 {
            *counts.entry(quantized(x, height - 1)).or_insert(0) += 1;
        }
    }
    for y in 1..height.saturating_sub(1) {
        *counts.entry(quantized(0, y)).or_insert(0) += 1;
        if width > 1 {
            *counts.entry(quantized(width - 1, y)).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by_key(|(_, n)| *n)
        .map(|(color, _)| color)
        .unwrap_or([0, 0, 0])
}

/// Number of 4-connected shapes in one region's row spans.
///
/// Spans arrive row-major sorted; consecutive rows are merged with a
/// two-pointer sweep over their x ranges.
fn component_count(spans: &[Span]) -> usize {
    if spans.is_empty() {
        return 0;
    }
    let mut set = DisjointSet::new(spans.len());
    let mut prev = 0..0usize;
    let mut i = 0;
    while i < spans.len() {
        let y = spans[i].y;
        let start = i;
        while i < spans.len() && spans[i].y == y {
            i += 1;
        }
        let current = start..i;
        if !prev.is_empty() && spans[prev.start].y + 1 == y {
            let (mut a, mut b) = (prev.start, current.start);
            while a < prev.end && b < current.end {
                if spans[a].x0 < spans[b].x1 && spans[b].x0 < spans[a].x1 {
                    set.union(a, b);
                }
                if spans[a].x1 <= spans[b].x1 {
                    a += 1;
                } else {
                    b += 1;
                }
            }
        }
        prev = current;
    }
    let mut roots: Vec<usize> = (0..spans.len()).map(|j| set.find(j)).collect();
    roots.sort_unstable();
    roots.dedup();
    roots.len()
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}
