//! Multi-view synchronisation.
//!
//! The engine owns every globe view and the data sets they draw. Rotation
//! groups notify it through a shared invalidation queue; [`SyncEngine::flush`]
//! then repaints each view bound to an invalidated group, layer by layer in
//! z-order. The host calls `flush` after every event, so one event's state
//! change is fully painted before the next event is processed.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt::{self, Write};
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::countries::CountryFeature;
use crate::drilldown::CountrySummary;
use crate::path::{Outline, PathGenerator, SphereOutline};
use crate::projection::{project, GeoError, ProjectorConfig, Rotation, ScreenPoint};
use crate::records::{EarthquakeRecord, PointRecord, StationRecord};
use crate::rotation::{GroupId, SharedRotation};
use crate::style::{MagnitudeScale, Rgb};
use crate::viewport::ViewportResizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub usize);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// Which records a marker layer draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    All,
    /// Only records inside the selected country.
    Selection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataKind {
    Countries,
    Earthquakes,
    Stations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Sphere,
    Countries,
    Earthquakes(Scope),
    Stations(Scope),
}

impl Layer {
    /// Paint order: sphere, polygons, then point overlays.
    pub fn z_index(&self) -> u8 {
        match self {
            Layer::Sphere => 0,
            Layer::Countries => 1,
            Layer::Earthquakes(_) => 2,
            Layer::Stations(_) => 3,
        }
    }

    pub fn data(&self) -> Option<DataKind> {
        match self {
            Layer::Sphere => None,
            Layer::Countries => Some(DataKind::Countries),
            Layer::Earthquakes(_) => Some(DataKind::Earthquakes),
            Layer::Stations(_) => Some(DataKind::Stations),
        }
    }

    fn scope(&self) -> Option<Scope> {
        match self {
            Layer::Earthquakes(scope) | Layer::Stations(scope) => Some(*scope),
            _ => None,
        }
    }
}

/// Marker appearance that does not depend on the data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerStyle {
    pub earthquake_opacity: f64,
    pub station_opacity: f64,
    pub station_color: Rgb,
    pub low: Rgb,
    pub high: Rgb,
    pub radius_factor: f64,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            earthquake_opacity: 0.8,
            station_opacity: 0.95,
            station_color: Rgb(0x2a, 0xa3, 0xff),
            low: Rgb(0xeb, 0x77, 0x6c),
            high: Rgb(0xe3, 0x1f, 0x07),
            radius_factor: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Earthquake,
    Station,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub kind: MarkerKind,
    /// Index into the engine's data set of this kind.
    pub record: usize,
    pub position: ScreenPoint,
    pub visible: bool,
    /// Zero on the far hemisphere; the marker is kept, not removed.
    pub opacity: f64,
    pub radius: f64,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountryPath {
    pub country: usize,
    pub outline: Outline,
    pub highlighted: bool,
}

impl CountryPath {
    pub fn svg(&self) -> String {
        self.outline.svg()
    }
}

/// Output of one repaint of a view.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobeFrame {
    pub rotation: Rotation,
    pub projector: ProjectorConfig,
    pub sphere: Option<SphereOutline>,
    pub countries: Vec<CountryPath>,
    pub markers: Vec<Marker>,
    /// Layers actually painted, in order.
    pub painted: Vec<Layer>,
}

impl GlobeFrame {
    fn new(rotation: Rotation, projector: ProjectorConfig) -> Self {
        Self {
            rotation,
            projector,
            sphere: None,
            countries: Vec::new(),
            markers: Vec::new(),
            painted: Vec::new(),
        }
    }

    /// Standalone SVG document of the frame, drawn in paint order.
    ///
    /// Far-side markers are written with zero opacity, like on screen.
    pub fn svg_document(&self, country: Rgb, highlight: Rgb) -> String {
        let width = self.projector.translate_x * 2.0;
        let height = self.projector.translate_y * 2.0;
        let mut doc = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width:.0}" height="{height:.0}" viewBox="0 0 {width:.2} {height:.2}">"#
        );
        doc.push('\n');

        if let Some(sphere) = self.sphere {
            let _ = writeln!(
                doc,
                r##"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="#0b1a2a" stroke="#555555"/>"##,
                sphere.center.x, sphere.center.y, sphere.radius
            );
        }
        for path in &self.countries {
            let stroke = if path.highlighted { highlight } else { country };
            let _ = writeln!(doc, r#"<path d="{}" fill="none" stroke="{stroke}"/>"#, path.svg());
        }
        for marker in &self.markers {
            let _ = writeln!(
                doc,
                r#"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{}" fill-opacity="{}"/>"#,
                marker.position.x, marker.position.y, marker.radius, marker.color, marker.opacity
            );
        }

        doc.push_str("</svg>\n");
        doc
    }
}

/// Construction parameters of one globe widget.
pub struct GlobeViewSpec {
    pub name: String,
    pub group: SharedRotation,
    pub layers: Vec<Layer>,
}

impl GlobeViewSpec {
    pub fn new(name: impl Into<String>, group: &SharedRotation, layers: Vec<Layer>) -> Self {
        Self {
            name: name.into(),
            group: Rc::clone(group),
            layers,
        }
    }
}

pub struct GlobeView {
    id: ViewId,
    name: String,
    group: SharedRotation,
    layers: Vec<Layer>,
    projector: Option<ProjectorConfig>,
    frame: Option<GlobeFrame>,
    pending: BTreeSet<DataKind>,
    paints: u64,
}

impl GlobeView {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &SharedRotation {
        &self.group
    }

    pub fn group_id(&self) -> GroupId {
        self.group.borrow().id()
    }

    pub fn frame(&self) -> Option<&GlobeFrame> {
        self.frame.as_ref()
    }

    /// Data sets this view is still waiting for.
    pub fn pending(&self) -> &BTreeSet<DataKind> {
        &self.pending
    }

    #[cfg(test)]
    pub fn paint_count(&self) -> u64 {
        self.paints
    }

    fn uses(&self, kind: DataKind) -> bool {
        self.layers.iter().any(|layer| layer.data() == Some(kind))
    }

    fn uses_selection(&self) -> bool {
        self.layers
            .iter()
            .any(|layer| *layer == Layer::Countries || layer.scope() == Some(Scope::Selection))
    }
}

pub struct SyncEngine {
    views: Vec<GlobeView>,
    groups: BTreeSet<GroupId>,
    invalidated: Rc<RefCell<BTreeSet<GroupId>>>,
    resizer: ViewportResizer,
    paths: Box<dyn PathGenerator>,
    style: MarkerStyle,
    magnitudes: MagnitudeScale,
    earthquakes: Vec<EarthquakeRecord>,
    stations: Vec<StationRecord>,
    countries: Vec<CountryFeature>,
    selection: Option<usize>,
    summary: Option<CountrySummary>,
}

impl SyncEngine {
    pub fn new(resizer: ViewportResizer, paths: Box<dyn PathGenerator>, style: MarkerStyle) -> Self {
        Self {
            views: Vec::new(),
            groups: BTreeSet::new(),
            invalidated: Rc::new(RefCell::new(BTreeSet::new())),
            resizer,
            paths,
            style,
            magnitudes: MagnitudeScale::from_records(&[], style.low, style.high, style.radius_factor),
            earthquakes: Vec::new(),
            stations: Vec::new(),
            countries: Vec::new(),
            selection: None,
            summary: None,
        }
    }

    /// Subscribe to a group so its writes invalidate the views bound to it.
    pub fn register_group(&mut self, group: &SharedRotation) {
        let id = group.borrow().id();
        if !self.groups.insert(id) {
            return;
        }

        let queue = Rc::clone(&self.invalidated);
        let mut group = group.borrow_mut();
        group.subscribe(move |id, _| {
            queue.borrow_mut().insert(id);
        });
        debug!(group = %id, name = group.name(), "rotation group registered");
    }

    pub fn add_view(&mut self, spec: GlobeViewSpec) -> ViewId {
        self.register_group(&spec.group);

        let mut layers = spec.layers;
        layers.sort_by_key(Layer::z_index);
        layers.dedup();

        let id = ViewId(self.views.len());
        info!(view = %id, name = %spec.name, ?layers, "globe view added");
        self.views.push(GlobeView {
            id,
            name: spec.name,
            group: spec.group,
            layers,
            projector: None,
            frame: None,
            pending: BTreeSet::new(),
            paints: 0,
        });
        id
    }

    pub fn view(&self, id: ViewId) -> Option<&GlobeView> {
        self.views.get(id.0)
    }

    pub fn frame(&self, id: ViewId) -> Option<&GlobeFrame> {
        self.view(id).and_then(GlobeView::frame)
    }

    pub fn earthquakes(&self) -> &[EarthquakeRecord] {
        &self.earthquakes
    }

    pub fn stations(&self) -> &[StationRecord] {
        &self.stations
    }

    pub fn countries(&self) -> &[CountryFeature] {
        &self.countries
    }

    pub fn magnitudes(&self) -> &MagnitudeScale {
        &self.magnitudes
    }

    pub fn selected_country(&self) -> Option<&CountryFeature> {
        self.selection.and_then(|i| self.countries.get(i))
    }

    pub fn summary(&self) -> Option<&CountrySummary> {
        self.summary.as_ref()
    }

    /// Repaint every view of every group invalidated since the last flush.
    ///
    /// Returns the number of views painted.
    pub fn flush(&mut self) -> usize {
        let groups = std::mem::take(&mut *self.invalidated.borrow_mut());
        groups
            .into_iter()
            .map(|group| self.repaint_group(group))
            .sum()
    }

    pub fn repaint_group(&mut self, group: GroupId) -> usize {
        let targets: Vec<usize> = self
            .views
            .iter()
            .enumerate()
            .filter(|(_, view)| view.group_id() == group)
            .map(|(i, _)| i)
            .collect();
        self.repaint(targets)
    }

    /// Fit a view to its container. A degenerate width keeps the previous
    /// projector; the next resize retries.
    pub fn resize_view(&mut self, id: ViewId, width: f64) -> Result<ProjectorConfig, GeoError> {
        let config = match self.resizer.fit(width) {
            Ok(config) => config,
            Err(e) => {
                debug!(view = %id, width, "resize skipped: {e}");
                return Err(e);
            }
        };

        let Some(view) = self.views.get_mut(id.0) else {
            return Ok(config);
        };
        view.projector = Some(config);
        self.paint_view(id.0);
        Ok(config)
    }

    pub fn set_earthquakes(&mut self, records: Vec<EarthquakeRecord>) -> usize {
        self.magnitudes = MagnitudeScale::from_records(
            &records,
            self.style.low,
            self.style.high,
            self.style.radius_factor,
        );
        self.earthquakes = records;
        self.refresh_summary();
        self.data_arrived(DataKind::Earthquakes)
    }

    pub fn set_stations(&mut self, records: Vec<StationRecord>) -> usize {
        self.stations = records;
        self.refresh_summary();
        self.data_arrived(DataKind::Stations)
    }

    pub fn set_countries(&mut self, countries: Vec<CountryFeature>) -> usize {
        self.countries = countries;
        // Indices from the old list no longer mean anything.
        self.selection = None;
        self.summary = None;
        self.data_arrived(DataKind::Countries)
    }

    /// Change the highlighted country and repaint the views that show it.
    pub fn select_country(&mut self, selection: Option<usize>) -> usize {
        let selection = selection.filter(|&i| i < self.countries.len());
        if selection == self.selection {
            return 0;
        }
        self.selection = selection;
        self.refresh_summary();

        let targets: Vec<usize> = self
            .views
            .iter()
            .enumerate()
            .filter(|(_, view)| view.uses_selection())
            .map(|(i, _)| i)
            .collect();
        self.repaint(targets)
    }

    fn refresh_summary(&mut self) {
        self.summary = self
            .selected_country()
            .map(|country| CountrySummary::build(country, &self.earthquakes, &self.stations));
    }

    fn data_arrived(&mut self, kind: DataKind) -> usize {
        let targets: Vec<usize> = self
            .views
            .iter()
            .enumerate()
            .filter(|(_, view)| view.uses(kind))
            .map(|(i, _)| i)
            .collect();
        info!(?kind, views = targets.len(), "data set updated");
        self.repaint(targets)
    }

    fn repaint(&mut self, targets: Vec<usize>) -> usize {
        targets
            .into_iter()
            .filter(|&i| self.paint_view(i))
            .count()
    }

    fn paint_view(&mut self, index: usize) -> bool {
        let view = &self.views[index];
        let Some(projector) = view.projector else {
            // Not laid out yet; the first successful resize paints it.
            debug!(view = %view.id, "paint skipped: no projector");
            return false;
        };
        let rotation = view.group.borrow().rotation();

        let mut frame = GlobeFrame::new(rotation, projector);
        let mut pending = BTreeSet::new();

        for &layer in &view.layers {
            if let Some(kind) = layer.data() {
                if self.is_empty(kind) {
                    pending.insert(kind);
                    continue;
                }
            }

            match layer {
                Layer::Sphere => frame.sphere = Some(SphereOutline::from_config(&projector)),
                Layer::Countries => self.paint_countries(view.id, rotation, &projector, &mut frame),
                Layer::Earthquakes(scope) => {
                    let magnitudes = &self.magnitudes;
                    let opacity = self.style.earthquake_opacity;
                    self.paint_markers(
                        &self.earthquakes,
                        self.scoped(scope, |s| &s.earthquakes),
                        rotation,
                        &projector,
                        &mut frame,
                        |record| MarkerAppearance {
                            kind: MarkerKind::Earthquake,
                            opacity,
                            radius: magnitudes.radius(record.magnitude),
                            color: magnitudes.color(record.magnitude),
                        },
                    );
                }
                Layer::Stations(scope) => {
                    let style = self.style;
                    self.paint_markers(
                        &self.stations,
                        self.scoped(scope, |s| &s.stations),
                        rotation,
                        &projector,
                        &mut frame,
                        |_| MarkerAppearance {
                            kind: MarkerKind::Station,
                            opacity: style.station_opacity,
                            radius: 1.0,
                            color: style.station_color,
                        },
                    );
                }
            }
            frame.painted.push(layer);
        }

        let view = &mut self.views[index];
        if !pending.is_empty() {
            debug!(view = %view.id, ?pending, "layers waiting for data");
        }
        view.frame = Some(frame);
        view.pending = pending;
        view.paints += 1;
        debug!(view = %view.id, paints = view.paints, "view painted");
        true
    }

    fn is_empty(&self, kind: DataKind) -> bool {
        match kind {
            DataKind::Countries => self.countries.is_empty(),
            DataKind::Earthquakes => self.earthquakes.is_empty(),
            DataKind::Stations => self.stations.is_empty(),
        }
    }

    /// `None` draws every record; `Some` restricts to the listed indices.
    fn scoped<'a>(
        &'a self,
        scope: Scope,
        members: impl Fn(&'a CountrySummary) -> &'a Vec<usize>,
    ) -> Option<&'a [usize]> {
        match scope {
            Scope::All => None,
            Scope::Selection => Some(self.summary.as_ref().map_or(&[][..], |s| members(s).as_slice())),
        }
    }

    fn paint_countries(
        &self,
        view: ViewId,
        rotation: Rotation,
        projector: &ProjectorConfig,
        frame: &mut GlobeFrame,
    ) {
        let selected = self.selected_country();
        for (index, country) in self.countries.iter().enumerate() {
            match self.paths.outline(&country.geometry, rotation, projector) {
                Ok(outline) if outline.is_empty() => {}
                Ok(outline) => frame.countries.push(CountryPath {
                    country: index,
                    outline,
                    highlighted: selected.is_some_and(|s| s.is_same_feature(country)),
                }),
                Err(e) => warn!(
                    %view,
                    country = country.display_name(),
                    error = %e,
                    "skipping country outline"
                ),
            }
        }
    }

    fn paint_markers<R: PointRecord>(
        &self,
        records: &[R],
        subset: Option<&[usize]>,
        rotation: Rotation,
        projector: &ProjectorConfig,
        frame: &mut GlobeFrame,
        appearance: impl Fn(&R) -> MarkerAppearance,
    ) {
        let mut push = |index: usize, record: &R| {
            let projected = project(record.location(), rotation, projector);
            let look = appearance(record);
            frame.markers.push(Marker {
                kind: look.kind,
                record: index,
                position: projected.point,
                visible: projected.visible,
                opacity: if projected.visible { look.opacity } else { 0.0 },
                radius: look.radius,
                color: look.color,
            });
        };

        match subset {
            None => records.iter().enumerate().for_each(|(i, r)| push(i, r)),
            Some(indices) => indices
                .iter()
                .filter_map(|&i| records.get(i).map(|r| (i, r)))
                .for_each(|(i, r)| push(i, r)),
        }
    }
}

struct MarkerAppearance {
    kind: MarkerKind,
    opacity: f64,
    radius: f64,
    color: Rgb,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::countries::tests::square;
    use crate::countries::CountryNames;
    use crate::drag::{DragRotationController, Pointer};
    use crate::path::OrthographicPaths;
    use crate::projection::{is_point_visible, GeoPoint};
    use crate::rotation::RotationGroup;
    use geo::{LineString, MultiPolygon, Polygon};

    fn engine() -> SyncEngine {
        SyncEngine::new(
            ViewportResizer::default(),
            Box::new(OrthographicPaths),
            MarkerStyle::default(),
        )
    }

    fn group(id: usize, name: &str) -> SharedRotation {
        RotationGroup::new(GroupId(id), name, Rotation::new(0.0, -20.0)).shared()
    }

    fn quakes() -> Vec<EarthquakeRecord> {
        vec![
            EarthquakeRecord::new(GeoPoint::new(10.0, 20.0), 5.5, "near, Front"),
            EarthquakeRecord::new(GeoPoint::new(139.0, 35.0), 6.1, "Honshu, Japan"),
        ]
    }

    fn stations() -> Vec<StationRecord> {
        vec![StationRecord {
            location: GeoPoint::new(12.0, 41.0),
            code: "AQU".to_string(),
            name: "L'Aquila".to_string(),
            network: "MN".to_string(),
            elevation: 710.0,
            telemetry: "Real-time".to_string(),
        }]
    }

    fn dual(engine: &mut SyncEngine, group: &SharedRotation) -> (ViewId, ViewId) {
        let quakes = engine.add_view(GlobeViewSpec::new(
            "earthquakes",
            group,
            vec![Layer::Sphere, Layer::Countries, Layer::Earthquakes(Scope::All)],
        ));
        let stations = engine.add_view(GlobeViewSpec::new(
            "stations",
            group,
            vec![Layer::Sphere, Layer::Countries, Layer::Stations(Scope::All)],
        ));
        (quakes, stations)
    }

    #[test]
    fn test_drag_on_one_globe_repaints_its_twin() {
        let mut engine = engine();
        let shared = group(0, "dual");
        let (a, b) = dual(&mut engine, &shared);
        engine.set_earthquakes(quakes());
        engine.set_stations(stations());
        engine.resize_view(a, 400.0).unwrap();
        engine.resize_view(b, 400.0).unwrap();

        let mut drag = DragRotationController::default();
        let group_a = engine.view(a).unwrap().group().clone();
        drag.on_drag_start(Pointer::new(0.0, 0.0), &group_a);
        drag.on_drag_move(Pointer::new(40.0, -10.0));
        drag.on_drag_end();

        assert_eq!(engine.flush(), 2);
        let expected = shared.borrow().rotation();
        assert_eq!(engine.frame(a).unwrap().rotation, expected);
        assert_eq!(engine.frame(b).unwrap().rotation, expected);
        assert_eq!(engine.flush(), 0);
    }

    #[test]
    fn test_independent_groups_do_not_repaint_each_other() {
        let mut engine = engine();
        let dual_group = group(0, "dual");
        let search_group = group(1, "search");
        let (a, b) = dual(&mut engine, &dual_group);
        let c = engine.add_view(GlobeViewSpec::new("search", &search_group, vec![Layer::Sphere]));
        for id in [a, b, c] {
            engine.resize_view(id, 300.0).unwrap();
        }

        search_group.borrow_mut().rotate_by(90.0, 0.0);
        assert_eq!(engine.flush(), 1);
        assert_eq!(engine.view(a).unwrap().paint_count(), 1);
        assert_eq!(engine.view(c).unwrap().paint_count(), 2);
        assert_ne!(
            engine.frame(a).unwrap().rotation,
            engine.frame(c).unwrap().rotation
        );
    }

    #[test]
    fn test_far_side_markers_are_kept_transparent() {
        let mut engine = engine();
        let shared = group(0, "dual");
        let (a, _) = dual(&mut engine, &shared);
        engine.resize_view(a, 600.0).unwrap();
        engine.set_earthquakes(quakes());

        let markers = &engine.frame(a).unwrap().markers;
        assert_eq!(markers.len(), 2);
        assert!(markers[0].visible);
        assert_eq!(markers[0].opacity, 0.8);
        // Tokyo is on the far side of the default orientation.
        assert!(!markers[1].visible);
        assert_eq!(markers[1].opacity, 0.0);
        assert!(markers[1].position.x.is_finite());
    }

    #[test]
    fn test_empty_layer_waits_for_data() {
        let mut engine = engine();
        let shared = group(0, "dual");
        let (a, b) = dual(&mut engine, &shared);
        engine.resize_view(a, 300.0).unwrap();
        engine.resize_view(b, 300.0).unwrap();

        let view = engine.view(b).unwrap();
        assert!(view.pending().contains(&DataKind::Stations));
        assert!(view.pending().contains(&DataKind::Countries));
        assert_eq!(view.frame().unwrap().painted, vec![Layer::Sphere]);

        assert_eq!(engine.set_stations(stations()), 1);
        let view = engine.view(b).unwrap();
        assert!(!view.pending().contains(&DataKind::Stations));
        assert_eq!(view.frame().unwrap().markers.len(), 1);
        assert_eq!(view.frame().unwrap().markers[0].kind, MarkerKind::Station);
    }

    #[test]
    fn test_views_paint_only_after_layout() {
        let mut engine = engine();
        let shared = group(0, "dual");
        let (a, _) = dual(&mut engine, &shared);

        shared.borrow_mut().rotate_by(5.0, 0.0);
        assert_eq!(engine.flush(), 0);
        assert!(engine.frame(a).is_none());

        assert!(engine.resize_view(a, 0.0).is_err());
        assert!(engine.frame(a).is_none());

        let config = engine.resize_view(a, 200.0).unwrap();
        assert_eq!(engine.frame(a).unwrap().projector, config);

        // A later degenerate width keeps the last good projector.
        assert!(engine.resize_view(a, -1.0).is_err());
        shared.borrow_mut().rotate_by(5.0, 0.0);
        assert_eq!(engine.flush(), 1);
        assert_eq!(engine.frame(a).unwrap().projector, config);
    }

    #[test]
    fn test_outlines_and_markers_share_the_clip_angle() {
        let mut engine = SyncEngine::new(
            ViewportResizer::default().with_clip_angle(80.0),
            Box::new(OrthographicPaths),
            MarkerStyle::default(),
        );
        let shared = RotationGroup::new(GroupId(0), "dual", Rotation::new(0.0, 0.0)).shared();
        let (a, _) = dual(&mut engine, &shared);
        engine.set_countries(vec![square("Rim", (82.0, -3.0), (88.0, 3.0))]);
        engine.set_earthquakes(vec![
            EarthquakeRecord::new(GeoPoint::new(85.0, 0.0), 5.0, "rim"),
            EarthquakeRecord::new(GeoPoint::new(70.0, 0.0), 5.0, "inside"),
        ]);
        engine.resize_view(a, 400.0).unwrap();

        let frame = engine.frame(a).unwrap();
        assert!(frame.countries.is_empty());
        assert!(!frame.markers[0].visible);
        assert!(frame.markers[1].visible);
        for (marker, quake) in frame.markers.iter().zip(engine.earthquakes()) {
            assert_eq!(
                marker.visible,
                is_point_visible(quake.location, frame.rotation, &frame.projector)
            );
        }
    }

    #[test]
    fn test_layers_are_painted_in_z_order() {
        let mut engine = engine();
        let shared = group(0, "dual");
        let id = engine.add_view(GlobeViewSpec::new(
            "shuffled",
            &shared,
            vec![
                Layer::Stations(Scope::All),
                Layer::Countries,
                Layer::Sphere,
                Layer::Earthquakes(Scope::All),
                Layer::Sphere,
            ],
        ));
        engine.set_countries(vec![square("Box", (-10.0, -10.0), (10.0, 10.0))]);
        engine.set_earthquakes(quakes());
        engine.set_stations(stations());
        engine.resize_view(id, 300.0).unwrap();

        assert_eq!(
            engine.frame(id).unwrap().painted,
            vec![
                Layer::Sphere,
                Layer::Countries,
                Layer::Earthquakes(Scope::All),
                Layer::Stations(Scope::All),
            ]
        );
    }

    #[test]
    fn test_malformed_country_is_skipped() {
        let mut engine = engine();
        let shared = group(0, "dual");
        let id = engine.add_view(GlobeViewSpec::new("countries", &shared, vec![Layer::Countries]));

        let broken = CountryFeature::new(
            None,
            CountryNames::named("Broken"),
            MultiPolygon::new(vec![Polygon::new(
                LineString::from(vec![(0.0, 0.0), (f64::NAN, 1.0), (1.0, 1.0), (0.0, 0.0)]),
                vec![],
            )]),
        );
        engine.set_countries(vec![broken, square("Box", (-10.0, 10.0), (10.0, 30.0))]);
        engine.resize_view(id, 300.0).unwrap();

        let frame = engine.frame(id).unwrap();
        assert_eq!(frame.countries.len(), 1);
        assert_eq!(frame.countries[0].country, 1);
        assert!(frame.countries[0].svg().starts_with('M'));
    }

    #[test]
    fn test_selection_scope_and_highlight() {
        let mut engine = engine();
        let shared = group(1, "search");
        let id = engine.add_view(GlobeViewSpec::new(
            "search",
            &shared,
            vec![
                Layer::Sphere,
                Layer::Countries,
                Layer::Earthquakes(Scope::Selection),
                Layer::Stations(Scope::Selection),
            ],
        ));
        engine.set_countries(vec![
            square("Front", (0.0, 10.0), (20.0, 30.0)),
            square("Italy", (6.0, 36.0), (19.0, 47.0)),
        ]);
        engine.set_earthquakes(quakes());
        engine.set_stations(stations());
        engine.resize_view(id, 300.0).unwrap();
        assert!(engine.frame(id).unwrap().markers.is_empty());

        assert_eq!(engine.select_country(Some(0)), 1);
        let frame = engine.frame(id).unwrap();
        assert_eq!(frame.markers.len(), 1);
        assert_eq!(frame.markers[0].kind, MarkerKind::Earthquake);
        assert!(frame.countries.iter().any(|c| c.country == 0 && c.highlighted));
        assert!(frame.countries.iter().all(|c| c.country == 0 || !c.highlighted));

        assert_eq!(engine.select_country(Some(1)), 1);
        let frame = engine.frame(id).unwrap();
        assert_eq!(frame.markers.len(), 1);
        assert_eq!(frame.markers[0].kind, MarkerKind::Station);

        engine.select_country(None);
        assert!(engine.frame(id).unwrap().markers.is_empty());
        assert!(engine.summary().is_none());
    }

    #[test]
    fn test_highlight_covers_every_part_with_the_same_id() {
        let mut engine = engine();
        let shared = group(1, "search");
        let id = engine.add_view(GlobeViewSpec::new("search", &shared, vec![Layer::Countries]));
        engine.set_countries(vec![
            square("Chile", (-75.0, -40.0), (-70.0, -20.0)),
            square("Chile", (-80.0, -34.0), (-78.0, -33.0)),
            square("Peru", (-80.0, -18.0), (-70.0, -5.0)),
        ]);
        engine.resize_view(id, 300.0).unwrap();
        shared.borrow_mut().set(Rotation::new(75.0, 20.0));
        engine.flush();

        engine.select_country(Some(0));
        let highlighted: Vec<usize> = engine
            .frame(id)
            .unwrap()
            .countries
            .iter()
            .filter(|c| c.highlighted)
            .map(|c| c.country)
            .collect();
        assert_eq!(highlighted, vec![0, 1]);
    }

    #[test]
    fn test_svg_document_keeps_paint_order() {
        let mut engine = engine();
        let shared = group(0, "dual");
        let (a, _) = dual(&mut engine, &shared);
        engine.set_countries(vec![square("Box", (-10.0, 10.0), (10.0, 30.0))]);
        engine.set_earthquakes(quakes());
        engine.resize_view(a, 200.0).unwrap();

        let doc = engine
            .frame(a)
            .unwrap()
            .svg_document(Rgb(0x6b, 0x8e, 0x23), Rgb(0xff, 0xa5, 0x00));
        assert!(doc.starts_with("<svg "));
        assert!(doc.trim_end().ends_with("</svg>"));

        let sphere = doc.find("<circle").unwrap();
        let country = doc.find("<path d=\"M").unwrap();
        assert!(sphere < country);
        assert!(doc.contains(r##"stroke="#6b8e23""##));
        // Tokyo stays in the document, fully transparent.
        assert_eq!(doc.matches(r#"fill-opacity="0""#).count(), 1);
        assert_eq!(doc.matches(r#"fill-opacity="0.8""#).count(), 1);
    }
}
