//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - upper/lower bands: `-` lines
//! - observed reference rate: `*` line, broken on days without a print unless
//!   `connect_gaps` is set

use crate::domain::MergedView;

/// Render the corridor and the observed rate, one x column per day bucket.
pub fn render_bands_plot(merged: &MergedView, width: usize, height: usize, connect_gaps: bool) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let Some((first, last)) = merged.rows.first().zip(merged.rows.last()) else {
        return "Plot: (no corridor)\n".to_string();
    };

    let (y_min, y_max) = y_range(merged).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);
    let x_max = (merged.len().saturating_sub(1)).max(1) as f64;

    let mut grid = vec![vec![' '; width]; height];

    // Observed first: the band lines only fill empty cells, so the rate stays visible.
    let mut prev: Option<(usize, usize)> = None;
    for (i, row) in merged.rows.iter().enumerate() {
        let Some(fx) = row.observed else {
            if !connect_gaps {
                prev = None;
            }
            continue;
        };
        let x = map_x(i as f64, 0.0, x_max, width);
        let y = map_y(fx, y_min, y_max, height);
        match prev {
            Some((x0, y0)) => draw_line(&mut grid, x0, y0, x, y, '*'),
            None => grid[y][x] = '*',
        }
        prev = Some((x, y));
    }

    let upper: Vec<(f64, f64)> = merged.rows.iter().enumerate().map(|(i, r)| (i as f64, r.upper)).collect();
    let lower: Vec<(f64, f64)> = merged.rows.iter().enumerate().map(|(i, r)| (i as f64, r.lower)).collect();
    draw_curve(&mut grid, &upper, 0.0, x_max, y_min, y_max);
    draw_curve(&mut grid, &lower, 0.0, x_max, y_min, y_max);

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: {} .. {} | y=[{y_min:.2}, {y_max:.2}]\n",
        first.date, last.date
    ));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn y_range(merged: &MergedView) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for r in &merged.rows {
        for y in [Some(r.lower), Some(r.upper), r.observed].into_iter().flatten() {
            if y.is_finite() {
                min_y = min_y.min(y);
                max_y = max_y.max(y);
            }
        }
    }

    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], t_min: f64, t_max: f64, y_min: f64, y_max: f64) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(t, y) in curve {
        let x = map_x(t, t_min, t_max, width);
        let yy = map_y(y, y_min, y_max, height);
        match prev {
            Some((x0, y0)) => draw_line(grid, x0, y0, x, yy, '-'),
            None if grid[yy][x] == ' ' => grid[yy][x] = '-',
            None => {}
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham-ish). Only fills empty cells.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
