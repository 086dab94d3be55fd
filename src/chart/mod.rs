/*
 * Chart adapter: price time series to a two-series time chart configuration
 */

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use crate::models::PricePoint;

pub const DEFAULT_LABEL_A: &str = "Uniswap V3";
pub const DEFAULT_LABEL_B: &str = "Binance";

const COLOR_A: &str = "#58a6ff";
const COLOR_B: &str = "#f78166";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesStyle {
    Line,
    Area,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    /// `(epoch millis, price)` pairs in time order.
    pub data: Vec<(i64, f64)>,
}

/// Visible window as percentages of the full time axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoomWindow {
    pub start: f64,
    pub end: f64,
}

impl Default for ZoomWindow {
    fn default() -> Self {
        Self { start: 0.0, end: 100.0 }
    }
}

impl ZoomWindow {
    #[must_use]
    pub fn new(start: f64, end: f64) -> Self {
        let start = if start.is_nan() { 0.0 } else { start.clamp(0.0, 100.0) };
        let end = if end.is_nan() { 100.0 } else { end.clamp(0.0, 100.0) };
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.start <= 0.0 && self.end >= 100.0
    }
}

#[derive(Debug, Clone)]
pub struct PriceChart {
    points: Vec<PricePoint>,
    series: [Series; 2],
    style: SeriesStyle,
    zoom: ZoomWindow,
}

impl PriceChart {
    #[must_use]
    pub fn new(points: &[PricePoint], label_a: &str, label_b: &str) -> Self {
        let mut points = points.to_vec();
        points.sort_by_key(|p| p.time);

        let series_a = points.iter().map(|p| (p.time.timestamp_millis(), p.price_a)).collect();
        let series_b = points.iter().map(|p| (p.time.timestamp_millis(), p.price_b)).collect();

        Self {
            points,
            series: [
                Series { name: label_a.to_string(), data: series_a },
                Series { name: label_b.to_string(), data: series_b },
            ],
            style: SeriesStyle::Area,
            zoom: ZoomWindow::default(),
        }
    }

    #[must_use]
    pub fn from_points(points: &[PricePoint]) -> Self {
        Self::new(points, DEFAULT_LABEL_A, DEFAULT_LABEL_B)
    }

    #[must_use]
    pub fn with_style(mut self, style: SeriesStyle) -> Self {
        self.style = style;
        self
    }

    #[must_use]
    pub fn series(&self) -> &[Series; 2] {
        &self.series
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn zoom_window(&self) -> ZoomWindow {
        self.zoom
    }

    /// Narrows the visible window; the series themselves are left untouched.
    pub fn zoom(&mut self, start_pct: f64, end_pct: f64) {
        self.zoom = ZoomWindow::new(start_pct, end_pct);
    }

    pub fn reset_zoom(&mut self) {
        self.zoom = ZoomWindow::default();
    }

    #[must_use]
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.points.first()?.time, self.points.last()?.time))
    }

    #[must_use]
    pub fn visible_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let (first, last) = self.time_span()?;
        let span_ms = (last - first).num_milliseconds();

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let offset = |pct: f64| chrono::Duration::milliseconds((span_ms as f64 * pct / 100.0).round() as i64);

        Some((first + offset(self.zoom.start), first + offset(self.zoom.end)))
    }

    #[must_use]
    pub fn visible_points(&self) -> &[PricePoint] {
        let Some((from, to)) = self.visible_range() else {
            return &[];
        };
        let start = self.points.partition_point(|p| p.time < from);
        let end = self.points.partition_point(|p| p.time <= to);
        &self.points[start..end.max(start)]
    }

    /// Sample closest to `instant`; ties go to the earlier one.
    #[must_use]
    pub fn nearest(&self, instant: DateTime<Utc>) -> Option<&PricePoint> {
        let idx = self.points.partition_point(|p| p.time < instant);
        let after = self.points.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.points.get(i));

        match (before, after) {
            (Some(b), Some(a)) => {
                if (instant - b.time) <= (a.time - instant) {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (Some(b), None) => Some(b),
            (None, a) => a,
        }
    }

    /// Both series' values at the sample nearest to `instant`.
    #[must_use]
    pub fn tooltip_at(&self, instant: DateTime<Utc>) -> Option<String> {
        let point = self.nearest(instant)?;
        Some(format!(
            "{}\n{}: ${:.2}\n{}: ${:.2}",
            point.time.format("%Y-%m-%d %H:%M:%S"),
            self.series[0].name,
            point.price_a,
            self.series[1].name,
            point.price_b,
        ))
    }

    /// Chart option in the shape the dashboard's charting library consumes.
    #[must_use]
    pub fn to_config(&self) -> Value {
        let area = |color: &str| match self.style {
            SeriesStyle::Area => json!({ "opacity": 0.15, "color": color }),
            SeriesStyle::Line => Value::Null,
        };
        let series: Vec<Value> = self
            .series
            .iter()
            .zip([COLOR_A, COLOR_B])
            .map(|(s, color)| {
                json!({
                    "name": s.name,
                    "type": "line",
                    "showSymbol": false,
                    "sampling": "lttb",
                    "lineStyle": { "width": 1.5, "color": color },
                    "itemStyle": { "color": color },
                    "areaStyle": area(color),
                    "data": s.data,
                })
            })
            .collect();

        json!({
            "tooltip": {
                "trigger": "axis",
                "axisPointer": { "type": "cross" },
            },
            "legend": { "data": [self.series[0].name, self.series[1].name] },
            "xAxis": { "type": "time", "boundaryGap": false },
            "yAxis": { "type": "value", "name": "Price (USDT)", "scale": true },
            "dataZoom": [
                { "type": "inside", "start": self.zoom.start, "end": self.zoom.end },
                { "type": "slider", "start": self.zoom.start, "end": self.zoom.end },
            ],
            "series": series,
        })
    }
}
