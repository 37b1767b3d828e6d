mod animation;
mod config;
mod countries;
mod drag;
mod drilldown;
mod path;
mod projection;
mod records;
mod rotation;
mod search;
mod style;
mod sync;
mod tooltip;
mod ui;
mod viewport;

use anyhow::{Context as _, Result};
use clap::Parser;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal};
use std::fs::File;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use countries::{load_countries, CountryFeature};
use drag::DragRotationController;
use drilldown::ActiveLayer;
use path::OrthographicPaths;
use projection::ScreenPoint;
use records::{load_earthquakes, load_stations, DataError, EarthquakeRecord, StationRecord};
use rotation::{GroupId, RotationGroup, SharedRotation};
use search::{GeoSearchSelector, SearchError};
use animation::RotationAnimator;
use sync::{GlobeViewSpec, Layer, MarkerKind, Scope, SyncEngine, ViewId};
use tooltip::Tooltip;
use ui::ScreenLayout;
use viewport::ViewportResizer;

const DUAL_GROUP: GroupId = GroupId(0);
const SEARCH_GROUP: GroupId = GroupId(1);

/// Pixels of simulated drag per arrow key press.
const NUDGE_STEP: f64 = 5.0;

#[derive(Parser, Debug)]
#[command(author, version, about = "Linked orthographic globes of earthquakes and seismic stations")]
struct Args {
    /// Config file (default: ./seismoglobe.toml, then the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Earthquake CSV (latitude,longitude,mag,place,...)
    #[arg(long)]
    earthquakes: Option<PathBuf>,

    /// Station CSV (latitude,longitude,station code,name,network code,...)
    #[arg(long)]
    stations: Option<PathBuf>,

    /// Country polygons as a GeoJSON FeatureCollection
    #[arg(long)]
    countries: Option<PathBuf>,

    /// Where log output goes; the terminal belongs to the UI
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
}

/// What the pointer is resting on.
#[derive(Debug, Clone, PartialEq)]
pub struct Hover {
    pub view: ViewId,
    /// `None` for a country.
    pub kind: Option<MarkerKind>,
    pub record: usize,
    pub tooltip: Tooltip,
}

enum Loaded {
    Earthquakes(Result<Vec<EarthquakeRecord>, DataError>),
    Stations(Result<Vec<StationRecord>, DataError>),
    Countries(Result<Vec<CountryFeature>, DataError>),
}

pub struct AppState {
    config: Config,
    engine: SyncEngine,
    dual: SharedRotation,
    views: [ViewId; 3],
    layout: ScreenLayout,
    drag: DragRotationController,
    dragging: Option<ViewId>,
    animator: RotationAnimator,
    selector: GeoSearchSelector,
    input: InputMode,
    query: String,
    status: Option<String>,
    search_progress: Option<f64>,
    active_layer: ActiveLayer,
    focus: ViewId,
    hover: Option<Hover>,
    loading: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let (mut config, config_source) = Config::discover(args.config.as_deref())?;
    if let Some(path) = args.earthquakes {
        config.data.earthquakes = path;
    }
    if let Some(path) = args.stations {
        config.data.stations = path;
    }
    if let Some(path) = args.countries {
        config.data.countries = path;
    }
    if let Some(path) = args.log_file {
        config.display.log_file = path;
    }

    init_logging(&config)?;
    info!(config = ?config_source, "seismoglobe starting");

    let loader = spawn_loader(&config);
    let mut app_state = AppState::new(config);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run TUI
    let res = run_app(&mut terminal, &mut app_state, &loader);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn init_logging(config: &Config) -> Result<()> {
    let file = File::create(&config.display.log_file)
        .with_context(|| format!("creating log file {}", config.display.log_file.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// Parse each data set off the UI thread and hand it over as soon as it is ready.
fn spawn_loader(config: &Config) -> Receiver<Loaded> {
    let (tx, rx) = mpsc::channel();
    let paths = config.data.clone();

    thread::spawn(move || {
        // Countries first: every globe draws them.
        let sends = [
            tx.send(Loaded::Countries(load_countries(&paths.countries))),
            tx.send(Loaded::Earthquakes(load_earthquakes(&paths.earthquakes))),
            tx.send(Loaded::Stations(load_stations(&paths.stations))),
        ];
        if sends.iter().any(Result::is_err) {
            debug!("UI closed before data finished loading");
        }
    });

    rx
}

impl AppState {
    fn new(config: Config) -> Self {
        let initial = config.globe.initial_rotation();
        let dual = RotationGroup::new(DUAL_GROUP, "dual", initial).shared();
        let search_group = RotationGroup::new(SEARCH_GROUP, "search", initial).shared();

        let resizer =
            ViewportResizer::new(config.globe.margin).with_clip_angle(config.globe.clip_angle);
        let mut engine = SyncEngine::new(resizer, Box::new(OrthographicPaths), config.markers.style());

        let earthquakes = engine.add_view(GlobeViewSpec::new(
            "earthquakes",
            &dual,
            vec![Layer::Sphere, Layer::Countries, Layer::Earthquakes(Scope::All)],
        ));
        let stations = engine.add_view(GlobeViewSpec::new(
            "stations",
            &dual,
            vec![Layer::Sphere, Layer::Countries, Layer::Stations(Scope::All)],
        ));
        let search = engine.add_view(GlobeViewSpec::new(
            "search",
            &search_group,
            vec![
                Layer::Sphere,
                Layer::Countries,
                Layer::Earthquakes(Scope::Selection),
                Layer::Stations(Scope::Selection),
            ],
        ));
        let views = [earthquakes, stations, search];

        let selector = GeoSearchSelector::new(search_group, config.search.animation());
        let drag = DragRotationController::new(config.globe.sensitivity);
        let active_layer = config.display.active_layer;

        Self {
            config,
            engine,
            dual,
            views,
            layout: ui::layout(Rect::default(), views),
            drag,
            dragging: None,
            animator: RotationAnimator::new(),
            selector,
            input: InputMode::Normal,
            query: String::new(),
            status: None,
            search_progress: None,
            active_layer,
            focus: earthquakes,
            hover: None,
            loading: 3,
        }
    }

    fn group(&self, id: GroupId) -> &SharedRotation {
        if id == SEARCH_GROUP {
            self.selector.group()
        } else {
            &self.dual
        }
    }

    /// Recompute the layout and refit every globe whose area changed.
    fn relayout(&mut self, area: Rect) {
        let layout = ui::layout(area, self.views);
        for globe in &layout.globes {
            let unchanged = self
                .layout
                .globe(globe.view)
                .is_some_and(|old| old.size == globe.size);
            if unchanged && self.engine.frame(globe.view).is_some() {
                continue;
            }
            if let Err(e) = self.engine.resize_view(globe.view, globe.size) {
                debug!(view = %globe.view, "globe area too small: {e}");
            }
        }
        self.layout = layout;
    }

    fn receive(&mut self, loaded: Loaded) {
        self.loading = self.loading.saturating_sub(1);
        match loaded {
            Loaded::Earthquakes(Ok(records)) => {
                info!(count = records.len(), "earthquakes loaded");
                self.engine.set_earthquakes(records);
            }
            Loaded::Stations(Ok(records)) => {
                info!(count = records.len(), "stations loaded");
                self.engine.set_stations(records);
            }
            Loaded::Countries(Ok(countries)) => {
                info!(count = countries.len(), "countries loaded");
                // Selection indices refer to the old list.
                self.selector.clear_selection();
                self.engine.set_countries(countries);
            }
            Loaded::Earthquakes(Err(e)) | Loaded::Stations(Err(e)) | Loaded::Countries(Err(e)) => {
                warn!(error = %e, "data set failed to load");
                self.status = Some(format!("Load error: {e}"));
            }
        }
    }

    /// Advance animations and write their frames through the groups.
    fn tick(&mut self, now: Instant) {
        self.search_progress = self.animator.progress(SEARCH_GROUP, now);
        for frame in self.animator.tick(now) {
            self.group(frame.group).borrow_mut().set(frame.rotation);
            if frame.finished && frame.group == SEARCH_GROUP {
                self.selector.settle();
                self.search_progress = None;
            }
        }
    }

    fn submit_search(&mut self, now: Instant) {
        let query = std::mem::take(&mut self.query);
        let result = self
            .selector
            .submit(&query, self.engine.countries(), &mut self.animator, now);

        match result {
            Ok(hit) => {
                debug!(index = hit.index, target = ?hit.target.as_array(), "flying to search hit");
                self.status = None;
            }
            Err(e @ (SearchError::NotLoaded | SearchError::EmptyQuery)) => {
                self.status = Some(e.to_string());
                return;
            }
            Err(e @ SearchError::NotFound(_)) => self.status = Some(e.to_string()),
        }
        self.engine.select_country(self.selector.selected());
    }

    fn clear_selection(&mut self) {
        self.selector.clear_selection();
        self.engine.select_country(self.selector.selected());
        self.status = None;
    }

    /// Write the focused globe's current frame as an SVG file.
    fn save_focused(&mut self) {
        let Some(view) = self.engine.view(self.focus) else {
            return;
        };
        let Some(frame) = view.frame() else {
            self.status = Some(format!("{} globe has not been drawn yet", view.name()));
            return;
        };

        let display = &self.config.display;
        let path = display
            .export_dir
            .join(format!("seismoglobe-{}.svg", view.name()));
        let doc = frame.svg_document(display.country_color, display.highlight_color);

        self.status = Some(match std::fs::write(&path, doc) {
            Ok(()) => {
                info!(path = %path.display(), "globe saved");
                format!("Saved {}", path.display())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "saving globe failed");
                format!("Could not save {}: {e}", path.display())
            }
        });
    }

    fn on_mouse(&mut self, mouse: MouseEvent) {
        let (column, row) = (mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                let Some(area) = self.layout.globe_at(column, row).copied() else {
                    return;
                };
                let Some(group) = self.engine.view(area.view).map(|v| v.group().clone()) else {
                    return;
                };
                // A drag takes over from any fly-to on the same group.
                self.animator.cancel(group.borrow().id());
                self.drag.on_drag_start(area.to_pointer(column, row), &group);
                self.dragging = Some(area.view);
                self.focus = area.view;
                self.hover = None;
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                let Some(area) = self.dragging.and_then(|view| self.layout.globe(view)) else {
                    return;
                };
                self.drag.on_drag_move(area.to_pointer(column, row));
            }
            MouseEventKind::Up(MouseButton::Left) => {
                self.drag.on_drag_end();
                self.dragging = None;
            }
            MouseEventKind::Moved if !self.drag.is_dragging() => {
                self.hover = self.hover_at(column, row);
            }
            _ => {}
        }
    }

    fn hover_at(&self, column: u16, row: u16) -> Option<Hover> {
        let area = self.layout.globe_at(column, row)?;
        let frame = self.engine.frame(area.view)?;
        let pointer = area.to_pointer(column, row);
        let at = ScreenPoint::new(pointer.x, pointer.y);

        if let Some(marker) = tooltip::pick_marker(frame, at, self.config.markers.hover_tolerance) {
            let tooltip = match marker.kind {
                MarkerKind::Earthquake => self
                    .engine
                    .earthquakes()
                    .get(marker.record)
                    .map(tooltip::earthquake_tooltip),
                MarkerKind::Station => self
                    .engine
                    .stations()
                    .get(marker.record)
                    .map(tooltip::station_tooltip),
            }?;
            return Some(Hover {
                view: area.view,
                kind: Some(marker.kind),
                record: marker.record,
                tooltip,
            });
        }

        let point = projection::invert(at, frame.rotation, &frame.projector)
            .filter(|p| projection::is_point_visible(*p, frame.rotation, &frame.projector))?;
        let (index, country) = self
            .engine
            .countries()
            .iter()
            .enumerate()
            .find(|(_, country)| country.contains(point))?;
        Some(Hover {
            view: area.view,
            kind: None,
            record: index,
            tooltip: tooltip::country_tooltip(country),
        })
    }

    /// Returns `false` when the app should exit.
    fn on_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return true;
        }

        if self.input == InputMode::Search {
            match key.code {
                KeyCode::Enter => {
                    self.input = InputMode::Normal;
                    self.submit_search(Instant::now());
                }
                KeyCode::Esc => {
                    self.input = InputMode::Normal;
                    self.query.clear();
                }
                KeyCode::Backspace => {
                    self.query.pop();
                }
                KeyCode::Char(c) => self.query.push(c),
                _ => {}
            }
            return true;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Char('/') => {
                self.input = InputMode::Search;
                self.selector.reset();
                self.status = None;
            }
            KeyCode::Tab => {
                self.active_layer = self.active_layer.next();
                debug!(layer = self.active_layer.as_str(), "active layer changed");
            }
            KeyCode::Char('c') => self.clear_selection(),
            KeyCode::Char('s') => self.save_focused(),
            KeyCode::Left | KeyCode::Right | KeyCode::Up | KeyCode::Down => {
                let (dx, dy) = match key.code {
                    KeyCode::Left => (-NUDGE_STEP, 0.0),
                    KeyCode::Right => (NUDGE_STEP, 0.0),
                    KeyCode::Up => (0.0, -NUDGE_STEP),
                    _ => (0.0, NUDGE_STEP),
                };
                if let Some(group) = self.engine.view(self.focus).map(|v| v.group().clone()) {
                    self.animator.cancel(group.borrow().id());
                    self.drag.nudge(&group, dx, dy);
                }
            }
            _ => {}
        }
        true
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app_state: &mut AppState,
    loader: &Receiver<Loaded>,
) -> Result<()> {
    let size = terminal.size()?;
    app_state.relayout(Rect::new(0, 0, size.width, size.height));

    loop {
        // Pick up whatever the loader has finished
        loop {
            match loader.try_recv() {
                Ok(loaded) => app_state.receive(loaded),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    app_state.loading = 0;
                    break;
                }
            }
        }

        app_state.tick(Instant::now());
        app_state.engine.flush();

        terminal.draw(|f| {
            ui::draw_ui(f, app_state);
        })?;

        // Animate at frame rate, otherwise idle at the refresh rate.
        let timeout = if app_state.animator.is_idle() {
            app_state.config.display.refresh_rate
        } else {
            app_state.config.display.frame_interval
        };

        // Handle input
        if event::poll(Duration::from_millis(timeout))? {
            match event::read()? {
                Event::Key(key) => {
                    if !app_state.on_key(key) {
                        info!("quit requested");
                        return Ok(());
                    }
                }
                Event::Mouse(mouse) => app_state.on_mouse(mouse),
                Event::Resize(width, height) => {
                    app_state.relayout(Rect::new(0, 0, width, height));
                }
                _ => {}
            }
            // Every event's rotation change is painted before the next one.
            app_state.engine.flush();
        }
    }
}
