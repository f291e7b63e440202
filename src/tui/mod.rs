//! Ratatui-based terminal UI.
//!
//! Three views over one pipeline run: the corridor chart, the merged
//! day-by-day table and the state of each upstream source. The summary panel
//! stays in the header.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Row, Table},
};

use crate::app::Context;
use crate::app::pipeline::{self, RunOutput};
use crate::data::SeriesSource;
use crate::domain::MergedView;
use crate::error::AppError;

mod plotters_chart;

use plotters_chart::BandsPlottersChart;

const EXPORT_PATH: &str = "bands_export.csv";

/// Start the TUI.
pub fn run(ctx: Context) -> Result<(), AppError> {
    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal =
        Terminal::new(backend).map_err(|e| AppError::new(4, format!("Failed to initialize terminal: {e}")))?;

    let mut app = App::new(ctx);
    terminal
        .draw(|f| app.draw(f))
        .map_err(|e| AppError::new(4, format!("Terminal draw error: {e}")))?;
    app.refresh(false)?;
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(4, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(4, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Chart,
    Table,
    Sources,
}

impl View {
    fn next(self) -> Self {
        match self {
            View::Chart => View::Table,
            View::Table => View::Sources,
            View::Sources => View::Chart,
        }
    }

    fn title(self) -> &'static str {
        match self {
            View::Chart => "Reference rate and bands",
            View::Table => "Daily table",
            View::Sources => "Sources",
        }
    }
}

struct App {
    ctx: Context,
    view: View,
    connect_gaps: bool,
    table_offset: usize,
    status: String,
    run: Option<RunOutput>,
}

impl App {
    fn new(ctx: Context) -> Self {
        let status = if ctx.fetcher.is_offline() {
            "Offline: fixed phase only.".to_string()
        } else {
            "Fetching sources...".to_string()
        };
        Self {
            ctx,
            view: View::Chart,
            connect_gaps: true,
            table_offset: 0,
            status,
            run: None,
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(4, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(4, format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::new(4, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if matches!(key.code, KeyCode::Char('r') | KeyCode::Char('R')) {
                        self.status = "Fetching sources...".to_string();
                        terminal
                            .draw(|f| self.draw(f))
                            .map_err(|e| AppError::new(4, format!("Terminal draw error: {e}")))?;
                    }
                    if self.handle_key(key.code)? {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool, AppError> {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Tab => {
                self.view = self.view.next();
                self.status = format!("view: {}", self.view.title());
            }
            KeyCode::Char('r') => self.refresh(false)?,
            KeyCode::Char('R') => self.refresh(true)?,
            KeyCode::Char('c') => {
                self.connect_gaps = !self.connect_gaps;
                self.status = format!("connect gaps: {}", if self.connect_gaps { "on" } else { "off" });
            }
            KeyCode::Up => self.table_offset = self.table_offset.saturating_sub(1),
            KeyCode::Down => self.scroll_to(self.table_offset.saturating_add(1)),
            KeyCode::PageUp => self.table_offset = self.table_offset.saturating_sub(20),
            KeyCode::PageDown => self.scroll_to(self.table_offset.saturating_add(20)),
            KeyCode::Home => self.table_offset = 0,
            KeyCode::End => self.scroll_to(usize::MAX),
            KeyCode::Char('e') => self.export(),
            KeyCode::Char('d') => self.write_debug(),
            _ => {}
        }

        Ok(false)
    }

    /// Re-run the pipeline; `force` bypasses the cache.
    fn refresh(&mut self, force: bool) -> Result<(), AppError> {
        let run = pipeline::run(&self.ctx.bands, &self.ctx.fetcher, force)?;
        self.status = match run.warnings.len() {
            0 if self.ctx.fetcher.is_offline() => "Offline: fixed phase only.".to_string(),
            0 => format!("Loaded {} days.", run.merged.len()),
            1 => run.warnings[0].clone(),
            n => format!("{} (+{} more warnings)", run.warnings[0], n - 1),
        };
        self.run = Some(run);
        self.scroll_to(self.table_offset);
        Ok(())
    }

    fn scroll_to(&mut self, offset: usize) {
        let len = self.run.as_ref().map(|r| r.merged.len()).unwrap_or(0);
        self.table_offset = offset.min(len.saturating_sub(1));
    }

    fn export(&mut self) {
        let Some(run) = &self.run else {
            self.status = "Nothing to export yet.".to_string();
            return;
        };
        let path = PathBuf::from(EXPORT_PATH);
        self.status = match crate::io::write_merged_csv(&path, &run.merged) {
            Ok(()) => format!("Wrote {} rows to {}", run.merged.len(), path.display()),
            Err(err) => format!("Export failed: {err}"),
        };
    }

    fn write_debug(&mut self) {
        let Some(run) = &self.run else {
            self.status = "No run available.".to_string();
            return;
        };
        self.status = match crate::debug::write_debug_bundle(&PathBuf::from("debug"), run, &self.ctx.bands) {
            Ok(path) => format!("Wrote debug bundle: {}", path.display()),
            Err(err) => format!("Debug write failed: {err}"),
        };
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(6), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        match self.view {
            View::Chart => self.draw_chart(frame, chunks[1]),
            View::Table => self.draw_table(frame, chunks[1]),
            View::Sources => self.draw_sources(frame, chunks[1]),
        }
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let gray = Style::default().fg(Color::Gray);
        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled("bands", Style::default().fg(Color::Cyan)),
            Span::raw(" | reference rate vs inflation-indexed corridor"),
        ]));

        let cfg = &self.ctx.bands;
        let span = self
            .run
            .as_ref()
            .and_then(|r| r.summary.span)
            .map(|(a, b)| format!("{a} .. {b}"))
            .unwrap_or_else(|| "-".to_string());
        lines.push(Line::from(Span::styled(
            format!(
                "fixed: {} .. {} [{:.0}, {:.0}] | corridor: {span} | connect gaps: {}",
                cfg.phase1_start,
                cfg.phase1_end,
                cfg.lower0,
                cfg.upper0,
                if self.connect_gaps { "on" } else { "off" },
            ),
            gray,
        )));

        if let Some(run) = &self.run {
            let s = &run.summary;
            let fx_line = match &s.last_fx {
                Some(fx) => format!(
                    "last: {:.2} on {} | bands [{:.2}, {:.2}] | gap to upper: {}",
                    fx.fx,
                    fx.date,
                    fx.lower,
                    fx.upper,
                    fx.gap_to_upper
                        .map(|g| format!("{:.2}%", g * 100.0))
                        .unwrap_or_else(|| "-".to_string()),
                ),
                None => "last: no reference rate data available".to_string(),
            };
            lines.push(Line::from(Span::styled(fx_line, Style::default().fg(Color::White))));

            let at = match &s.at_summary_date {
                Some(b) => format!("bands at {}: [{:.2}, {:.2}]", b.date, b.lower, b.upper),
                None => format!("bands at {}: n/a", s.summary_date),
            };
            lines.push(Line::from(Span::styled(at, gray)));
        }

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default().title(self.view.title()).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let Some(run) = &self.run else {
            let msg = Paragraph::new("Waiting for data...").style(Style::default().fg(Color::Yellow));
            frame.render_widget(msg, inner);
            return;
        };

        let series = chart_series(&run.merged, self.connect_gaps);
        let (chart_rect, insets) = chart_layout(inner);
        let widget = BandsPlottersChart {
            upper: &series.upper,
            lower: &series.lower,
            observed: &series.observed,
            x_bounds: series.x_bounds,
            y_bounds: series.y_bounds,
            x_label: "date",
            y_label: "ARS / USD",
            fmt_x: fmt_axis_date,
            fmt_y: fmt_axis_y,
        };

        frame.render_widget(widget, chart_rect);
        if let Some(insets) = insets {
            draw_axis_ticks(frame, inner, chart_rect, insets, series.x_bounds, series.y_bounds);
        }
    }

    fn draw_table(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default().title(self.view.title()).borders(Borders::ALL);
        let Some(run) = &self.run else {
            frame.render_widget(Paragraph::new("Waiting for data...").block(block), area);
            return;
        };

        let visible = area.height.saturating_sub(3) as usize;
        let rows = run
            .merged
            .rows
            .iter()
            .zip(run.projection.corridor.points())
            .skip(self.table_offset)
            .take(visible)
            .map(|(r, p)| {
                let observed = r.observed.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string());
                let style = if r.observed.is_some_and(|v| v > r.upper || v < r.lower) {
                    Style::default().fg(Color::Red)
                } else {
                    Style::default()
                };
                Row::new(vec![
                    r.date.to_string(),
                    format!("{:?}", p.phase).to_lowercase(),
                    format!("{:.2}", r.lower),
                    format!("{:.2}", r.upper),
                    observed,
                ])
                .style(style)
            });

        let table = Table::new(
            rows,
            [
                Constraint::Length(12),
                Constraint::Length(9),
                Constraint::Length(12),
                Constraint::Length(12),
                Constraint::Length(12),
            ],
        )
        .header(
            Row::new(vec!["date", "phase", "lower", "upper", "observed"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(block);
        frame.render_widget(table, area);
    }

    fn draw_sources(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default().title(self.view.title()).borders(Borders::ALL);
        let Some(run) = &self.run else {
            frame.render_widget(Paragraph::new("Waiting for data...").block(block), area);
            return;
        };

        let sources = self.ctx.fetcher.sources();
        let urls = [sources.reference.url(), sources.survey.url(), sources.price_index.url()];
        let rows = run.inputs.all().into_iter().zip(urls).map(|(f, url)| {
            let color = match f.warning {
                Some(_) => Color::Yellow,
                None => Color::Reset,
            };
            Row::new(vec![
                f.source.to_string(),
                f.status.label().to_string(),
                f.series.len().to_string(),
                f.series.observed_count().to_string(),
                f.series.last().map(|p| p.date.to_string()).unwrap_or_else(|| "-".to_string()),
                f.warning.clone().unwrap_or_else(|| url.to_string()),
            ])
            .style(Style::default().fg(color))
        });

        let table = Table::new(
            rows,
            [
                Constraint::Length(18),
                Constraint::Length(8),
                Constraint::Length(6),
                Constraint::Length(9),
                Constraint::Length(11),
                Constraint::Min(10),
            ],
        )
        .header(
            Row::new(vec!["source", "status", "rows", "observed", "last", "url / warning"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(block);
        frame.render_widget(table, area);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "Tab view  r refresh  R force  c gaps  ↑/↓ scroll  e export  d debug  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

/// Chart series in Plotters coordinates (x = days since CE).
#[derive(Debug, Clone, PartialEq)]
struct ChartSeries {
    upper: Vec<(f64, f64)>,
    lower: Vec<(f64, f64)>,
    observed: Vec<Vec<(f64, f64)>>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

fn chart_series(merged: &MergedView, connect_gaps: bool) -> ChartSeries {
    let x = |d: NaiveDate| d.num_days_from_ce() as f64;

    let upper: Vec<(f64, f64)> = merged.rows.iter().map(|r| (x(r.date), r.upper)).collect();
    let lower: Vec<(f64, f64)> = merged.rows.iter().map(|r| (x(r.date), r.lower)).collect();

    let mut observed: Vec<Vec<(f64, f64)>> = Vec::new();
    let mut current: Vec<(f64, f64)> = Vec::new();
    for r in &merged.rows {
        match r.observed {
            Some(v) => current.push((x(r.date), v)),
            None if !connect_gaps && !current.is_empty() => observed.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        observed.push(current);
    }

    let mut x_bounds = match (upper.first(), upper.last()) {
        (Some(a), Some(b)) => [a.0, b.0],
        _ => [0.0, 1.0],
    };
    if x_bounds[1] <= x_bounds[0] {
        x_bounds[1] = x_bounds[0] + 1.0;
    }

    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(_, y) in upper.iter().chain(&lower).chain(observed.iter().flatten()) {
        if y.is_finite() {
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }
    }
    if !y_min.is_finite() || !y_max.is_finite() || y_max <= y_min {
        y_min = 0.0;
        y_max = 1.0;
    }
    let pad = ((y_max - y_min).abs() * 0.05).max(1e-12);

    ChartSeries {
        upper,
        lower,
        observed,
        x_bounds,
        y_bounds: [y_min - pad, y_max + pad],
    }
}

fn fmt_axis_date(v: f64) -> String {
    NaiveDate::from_num_days_from_ce_opt(v.round() as i32)
        .map(|d| d.format("%Y-%m").to_string())
        .unwrap_or_default()
}

fn fmt_axis_y(v: f64) -> String {
    format!("{v:.0}")
}

#[derive(Debug, Clone, Copy)]
struct AxisInsets {
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
}

fn chart_layout(inner: Rect) -> (Rect, Option<AxisInsets>) {
    let insets = AxisInsets {
        left: 8,
        right: 2,
        top: 1,
        bottom: 2,
    };

    if inner.width <= insets.left + insets.right + 10 || inner.height <= insets.top + insets.bottom + 5 {
        return (inner, None);
    }

    let rect = Rect {
        x: inner.x + insets.left,
        y: inner.y + insets.top,
        width: inner.width - insets.left - insets.right,
        height: inner.height - insets.top - insets.bottom,
    };

    (rect, Some(insets))
}

fn draw_axis_ticks(
    frame: &mut ratatui::Frame<'_>,
    inner: Rect,
    chart: Rect,
    insets: AxisInsets,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
) {
    let ticks = 5usize;
    let style = Style::default().fg(Color::Gray);

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let x_val = x_bounds[0] + u * (x_bounds[1] - x_bounds[0]);
        let x = chart.x + ((chart.width - 1) as f64 * u).round() as u16;
        let label = fmt_axis_date(x_val);
        let label_len = label.len() as u16;
        let start = x.saturating_sub((label.len() / 2) as u16);
        let y = chart.y + chart.height;
        if y >= inner.y + inner.height - 1 {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let y_val = y_bounds[0] + u * (y_bounds[1] - y_bounds[0]);
        let y = chart.y + (chart.height - 1) - ((chart.height - 1) as f64 * u).round() as u16;
        let label = fmt_axis_y(y_val);
        let label_len = label.len() as u16;
        let x = inner.x + insets.left.saturating_sub(1);
        let start = x.saturating_sub(label.len() as u16);
        if start < inner.x {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    let x_label = Paragraph::new("date")
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Gray));
    let x_rect = Rect {
        x: chart.x,
        y: chart.y + chart.height + 1,
        width: chart.width,
        height: 1,
    };
    if x_rect.y < inner.y + inner.height {
        frame.render_widget(x_label, x_rect);
    }

    let y_label = Paragraph::new("ARS/USD").style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));
    let y_rect = Rect {
        x: inner.x,
        y: inner.y,
        width: insets.left.saturating_sub(1),
        height: 1,
    };
    frame.render_widget(y_label, y_rect);
}

#[cfg(test)]
mod tests {
    use chrono::Duration as Days;

    use super::*;
    use crate::domain::MergedRow;

    fn view(observed: &[Option<f64>]) -> MergedView {
        let start = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        MergedView {
            rows: observed
                .iter()
                .enumerate()
                .map(|(i, o)| MergedRow {
                    date: start + Days::days(i as i64),
                    lower: 1000.0,
                    upper: 1500.0,
                    observed: *o,
                })
                .collect(),
        }
    }

    #[test]
    fn gaps_split_observed_line_unless_connected() {
        let v = view(&[Some(1400.0), Some(1410.0), None, None, Some(1420.0)]);
        assert_eq!(chart_series(&v, false).observed.len(), 2);
        let joined = chart_series(&v, true);
        assert_eq!(joined.observed.len(), 1);
        assert_eq!(joined.observed[0].len(), 3);
    }

    #[test]
    fn bounds_cover_bands_with_padding() {
        let s = chart_series(&view(&[None, Some(1600.0)]), true);
        assert_eq!(s.x_bounds[1] - s.x_bounds[0], 1.0);
        assert!(s.y_bounds[0] < 1000.0);
        assert!(s.y_bounds[1] > 1600.0);
    }

    #[test]
    fn axis_dates_round_trip() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(fmt_axis_date(d.num_days_from_ce() as f64), "2026-01");
    }

    #[test]
    fn views_cycle() {
        assert_eq!(View::Chart.next().next().next(), View::Chart);
    }
}
