use chrono::Local;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::canvas::{Canvas, Circle, Context, Line as CanvasLine, Points},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::drag::Pointer;
use crate::drilldown::CountryMap;
use crate::search::{RotationPhase, SelectionState};
use crate::style::{Legend, Rgb};
use crate::sync::{GlobeFrame, MarkerKind, ViewId};
use crate::{AppState, InputMode};

const GLOBE_TITLES: [&str; 3] = ["Earthquakes", "Stations", "Search"];

/// Braille dots per terminal cell.
const DOTS_X: f64 = 2.0;
const DOTS_Y: f64 = 4.0;

/// Screen region of one globe canvas, in braille dot units.
///
/// Terminal cells are about twice as tall as wide, so one dot is close to
/// square and the globe stays round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobeArea {
    pub view: ViewId,
    pub outer: Rect,
    pub inner: Rect,
    /// Side of the square the globe is fitted into.
    pub size: f64,
    offset_x: f64,
    offset_y: f64,
}

impl GlobeArea {
    fn new(view: ViewId, outer: Rect) -> Self {
        let inner = Rect {
            x: outer.x + 1,
            y: outer.y + 1,
            width: outer.width.saturating_sub(2),
            height: outer.height.saturating_sub(2),
        };
        let (w, h) = (inner.width as f64 * DOTS_X, inner.height as f64 * DOTS_Y);
        let size = w.min(h);
        Self {
            view,
            outer,
            inner,
            size,
            offset_x: (w - size) / 2.0,
            offset_y: (h - size) / 2.0,
        }
    }

    pub fn contains(&self, column: u16, row: u16) -> bool {
        column >= self.inner.x
            && column < self.inner.x + self.inner.width
            && row >= self.inner.y
            && row < self.inner.y + self.inner.height
    }

    /// Centre of the cell in the globe's screen space (y down).
    pub fn to_pointer(&self, column: u16, row: u16) -> Pointer {
        let x = (column as f64 - self.inner.x as f64 + 0.5) * DOTS_X - self.offset_x;
        let y = (row as f64 - self.inner.y as f64 + 0.5) * DOTS_Y - self.offset_y;
        Pointer::new(x, y)
    }

    fn width(&self) -> f64 {
        self.inner.width as f64 * DOTS_X
    }

    fn height(&self) -> f64 {
        self.inner.height as f64 * DOTS_Y
    }

    /// Globe screen coordinates to canvas coordinates (y up).
    fn canvas(&self, x: f64, y: f64) -> (f64, f64) {
        (x + self.offset_x, self.height() - (y + self.offset_y))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenLayout {
    pub header: Rect,
    pub globes: Vec<GlobeArea>,
    pub drilldown: Rect,
    pub info: Rect,
    pub status: Rect,
    pub footer: Rect,
}

impl ScreenLayout {
    pub fn globe_at(&self, column: u16, row: u16) -> Option<&GlobeArea> {
        self.globes.iter().find(|area| area.contains(column, row))
    }

    pub fn globe(&self, view: ViewId) -> Option<&GlobeArea> {
        self.globes.iter().find(|area| area.view == view)
    }
}

/// Split the terminal; the globe views are given in display order.
pub fn layout(area: Rect, views: [ViewId; 3]) -> ScreenLayout {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),      // Header
            Constraint::Percentage(60), // Globes
            Constraint::Min(6),         // Drill-down and info
            Constraint::Length(3),      // Search / status
            Constraint::Length(3),      // Footer
        ])
        .split(area);

    let globe_columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(rows[1]);

    let lower = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[2]);

    ScreenLayout {
        header: rows[0],
        globes: views
            .iter()
            .zip(globe_columns.iter())
            .map(|(view, rect)| GlobeArea::new(*view, *rect))
            .collect(),
        drilldown: lower[0],
        info: lower[1],
        status: rows[3],
        footer: rows[4],
    }
}

pub fn draw_ui(f: &mut Frame, app: &AppState) {
    let layout = &app.layout;

    draw_header(f, layout.header, app);
    for (area, title) in layout.globes.iter().zip(GLOBE_TITLES) {
        draw_globe(f, area, title, app);
    }
    draw_drilldown(f, layout.drilldown, app);
    draw_info(f, layout.info, app);
    draw_status(f, layout.status, app);
    draw_footer(f, layout.footer);
}

fn color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.0, rgb.1, rgb.2)
}

/// Terminals have no alpha; fade toward the black background instead.
fn faded(rgb: Rgb, opacity: f64) -> Color {
    color(Rgb(0, 0, 0).mix(rgb, opacity))
}

fn draw_header(f: &mut Frame, area: Rect, app: &AppState) {
    let engine = &app.engine;
    let dual = app.dual.borrow().rotation();
    let search = app.selector.group().borrow().rotation();

    let header_text = vec![
        Line::from(vec![
            Span::styled("Earthquakes: ", Style::default().fg(Color::Cyan)),
            Span::raw(format!("{}  ", engine.earthquakes().len())),
            Span::styled("Stations: ", Style::default().fg(Color::Cyan)),
            Span::raw(format!("{}  ", engine.stations().len())),
            Span::styled("Countries: ", Style::default().fg(Color::Cyan)),
            Span::raw(format!("{}  ", engine.countries().len())),
            Span::styled(
                if app.loading > 0 { "loading…" } else { "" },
                Style::default().fg(Color::Yellow),
            ),
        ]),
        Line::from(vec![
            Span::styled("Rotation: ", Style::default().fg(Color::Cyan)),
            Span::raw(format!(
                "dual [{:.1}, {:.1}]  search [{:.1}, {:.1}]  ",
                dual.longitude(),
                dual.latitude(),
                search.longitude(),
                search.latitude()
            )),
            Span::styled("Time: ", Style::default().fg(Color::Cyan)),
            Span::raw(Local::now().format("%Y-%m-%d %H:%M:%S %Z").to_string()),
        ]),
    ];

    let header = Paragraph::new(header_text).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Seismoglobe")
            .style(Style::default().fg(Color::White)),
    );

    f.render_widget(header, area);
}

fn draw_globe(f: &mut Frame, area: &GlobeArea, title: &str, app: &AppState) {
    let focused = app.focus == area.view;
    let title = match app.engine.view(area.view) {
        Some(view) if app.animator.is_animating(view.group_id()) => format!("{title} (rotating)"),
        Some(view) if !view.pending().is_empty() => format!("{title} (waiting for data)"),
        _ => title.to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(if focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::White)
        });

    let Some(frame) = app.engine.frame(area.view) else {
        let empty = Paragraph::new("Waiting for layout")
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(empty, area.outer);
        return;
    };

    let canvas = Canvas::default()
        .block(block)
        .x_bounds([0.0, area.width()])
        .y_bounds([0.0, area.height()])
        .marker(symbols::Marker::Braille)
        .paint(|ctx| paint_globe(ctx, area, frame, app));

    f.render_widget(canvas, area.outer);
}

fn paint_globe(ctx: &mut Context, area: &GlobeArea, frame: &GlobeFrame, app: &AppState) {
    let display = &app.config.display;

    if let Some(sphere) = frame.sphere {
        let (x, y) = area.canvas(sphere.center.x, sphere.center.y);
        ctx.draw(&Circle {
            x,
            y,
            radius: sphere.radius,
            color: Color::DarkGray,
        });
    }

    // Other countries recede while one is highlighted.
    let dimmed = frame.countries.iter().any(|c| c.highlighted);
    for country in &frame.countries {
        let line_color = match (country.highlighted, dimmed) {
            (true, _) => color(display.highlight_color),
            (false, true) => color(display.country_color.darker(1.0)),
            (false, false) => color(display.country_color),
        };
        for run in &country.outline.runs {
            let mut segments: Vec<(usize, usize)> =
                (1..run.points.len()).map(|i| (i - 1, i)).collect();
            if run.closed && run.points.len() > 2 {
                segments.push((run.points.len() - 1, 0));
            }
            for (a, b) in segments {
                let (x1, y1) = area.canvas(run.points[a].x, run.points[a].y);
                let (x2, y2) = area.canvas(run.points[b].x, run.points[b].y);
                ctx.draw(&CanvasLine {
                    x1,
                    y1,
                    x2,
                    y2,
                    color: line_color,
                });
            }
        }
    }

    // Outlines go on their own layer so markers are not overdrawn.
    ctx.layer();

    let hover_factor = app.config.markers.quake_hover_factor;
    for marker in frame.markers.iter().filter(|m| m.visible && m.opacity > 0.0) {
        let (x, y) = area.canvas(marker.position.x, marker.position.y);
        let hovered = app
            .hover
            .as_ref()
            .is_some_and(|h| h.view == area.view && h.kind == Some(marker.kind) && h.record == marker.record);
        let fill = faded(marker.color, marker.opacity);

        match marker.kind {
            MarkerKind::Earthquake => {
                let radius = if hovered {
                    app.engine
                        .earthquakes()
                        .get(marker.record)
                        .map_or(marker.radius, |q| {
                            app.engine.magnitudes().radius_with(q.magnitude, hover_factor)
                        })
                } else {
                    marker.radius
                };
                ctx.draw(&Circle {
                    x,
                    y,
                    radius,
                    color: fill,
                });
            }
            MarkerKind::Station => {
                ctx.draw(&Points {
                    coords: &[(x, y)],
                    color: fill,
                });
                if hovered {
                    ctx.print(x, y, Span::styled("▲", Style::default().fg(fill)));
                }
            }
        }
    }
}

fn draw_drilldown(f: &mut Frame, area: Rect, app: &AppState) {
    let engine = &app.engine;
    let (Some(country), Some(summary)) = (engine.selected_country(), engine.summary()) else {
        let empty = Paragraph::new("Search for a country with /")
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Country"),
            );
        f.render_widget(empty, area);
        return;
    };

    let width = area.width.saturating_sub(2) as f64 * DOTS_X;
    let height = area.height.saturating_sub(2) as f64 * DOTS_Y;
    let map = CountryMap::build(
        country,
        summary,
        engine.earthquakes(),
        engine.stations(),
        app.active_layer,
        width,
        height,
    );

    let outline = color(app.config.display.highlight_color);
    let station = color(app.config.markers.station_color);
    let quake = color(app.config.markers.quake_high_color);

    let canvas = Canvas::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(summary.result_text(app.active_layer)),
        )
        .x_bounds([0.0, width])
        .y_bounds([0.0, height])
        .marker(symbols::Marker::Braille)
        .paint(|ctx| {
            for ring in &map.rings {
                for pair in ring.windows(2) {
                    ctx.draw(&CanvasLine {
                        x1: pair[0].x,
                        y1: height - pair[0].y,
                        x2: pair[1].x,
                        y2: height - pair[1].y,
                        color: outline,
                    });
                }
            }
            ctx.layer();

            let stations: Vec<(f64, f64)> = map.stations.iter().map(|p| (p.x, height - p.y)).collect();
            ctx.draw(&Points {
                coords: &stations,
                color: station,
            });
            let quakes: Vec<(f64, f64)> =
                map.earthquakes.iter().map(|p| (p.x, height - p.y)).collect();
            ctx.draw(&Points {
                coords: &quakes,
                color: quake,
            });

            if let Some(message) = &map.message {
                ctx.print(
                    width * 0.1,
                    height / 2.0,
                    Span::styled(message.clone(), Style::default().fg(Color::Yellow)),
                );
            }
        });

    f.render_widget(canvas, area);
}

fn draw_info(f: &mut Frame, area: Rect, app: &AppState) {
    let mut lines = vec![Line::from(vec![
        Span::styled(
            "Layer: ",
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(app.active_layer.as_str()),
    ])];

    if let Some(legend) = Legend::from_records(app.engine.earthquakes()) {
        let scale = app.engine.magnitudes();
        let swatch = |label: &str| {
            let value = label.parse::<f64>().unwrap_or(0.0);
            Span::styled(
                format!("● {label}  "),
                Style::default().fg(color(scale.color(value))),
            )
        };
        lines.push(Line::from(vec![
            Span::styled(
                "Magnitude: ",
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
            swatch(&legend.min),
            swatch(&legend.mid),
            swatch(&legend.max),
        ]));
    }
    lines.push(Line::from(vec![
        Span::styled("▲ ", Style::default().fg(color(app.config.markers.station_color))),
        Span::raw("Seismic station"),
    ]));

    if let Some(hover) = &app.hover {
        lines.push(Line::raw(""));
        lines.push(Line::from(Span::styled(
            hover.tooltip.title.clone(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )));
        lines.extend(hover.tooltip.lines.iter().map(|l| Line::raw(l.clone())));
    }

    let info = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Details"),
    );
    f.render_widget(Clear, area);
    f.render_widget(info, area);
}

fn draw_status(f: &mut Frame, area: Rect, app: &AppState) {
    let (text, style) = match app.input {
        InputMode::Search => (
            format!("Search: {}_", app.query),
            Style::default().fg(Color::Yellow),
        ),
        InputMode::Normal => match (&app.status, app.selector.state()) {
            (Some(message), _) => (message.clone(), Style::default().fg(Color::Red)),
            (None, SelectionState::Found { index, phase }) => {
                let name = app
                    .engine
                    .countries()
                    .get(index)
                    .map_or("?", |c| c.display_name());
                let text = match phase {
                    RotationPhase::Rotating => format!(
                        "Flying to {name} ({:.0}%)",
                        app.search_progress.unwrap_or(0.0) * 100.0
                    ),
                    RotationPhase::Settled => format!("Showing {name}"),
                };
                (text, Style::default().fg(Color::Green))
            }
            (None, _) => (
                "Press / to search for a country".to_string(),
                Style::default().fg(Color::Gray),
            ),
        },
    };

    let status = Paragraph::new(text)
        .style(style)
        .block(Block::default().borders(Borders::ALL).title("Search"));
    f.render_widget(status, area);
}

fn draw_footer(f: &mut Frame, area: Rect) {
    let footer = Paragraph::new(
        "Drag: Rotate | ←/→/↑/↓: Nudge | /: Search | Tab: Layer | c: Clear | s: Save SVG | q/ESC: Quit",
    )
    .style(Style::default().fg(Color::Gray))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(footer, area);
}
