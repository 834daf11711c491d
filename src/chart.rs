//! Material decay series shown next to the timeline.

use serde::Serialize;

use crate::{locale, models::Language};

/// Remaining structural integrity (%) per material at each chart point.
const DECAY: [(u8, u8, u8); 9] = [
    (100, 100, 100),
    (95, 99, 100),
    (20, 80, 100),
    (0, 25, 99),
    (0, 5, 95),
    (0, 1, 80),
    (0, 0, 60),
    (0, 0, 20),
    (0, 0, 5),
];

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ChartPoint {
    pub name: String,
    pub wood: u8,
    pub steel: u8,
    pub stone: u8,
}

#[derive(Debug, Serialize, Clone)]
pub struct DecayChart {
    pub language: Language,
    pub y_axis: String,
    pub datasets: ChartDatasets,
    pub points: Vec<ChartPoint>,
    /// Point to highlight for the timeline section currently in view.
    pub highlight: Option<usize>,
}

#[derive(Debug, Serialize, Clone)]
pub struct ChartDatasets {
    pub wood: String,
    pub steel: String,
    pub stone: String,
}

pub fn section_index(section: &str) -> Option<usize> {
    match section {
        "year" => Some(1),
        "century" => Some(2),
        "millennium" => Some(3),
        "future" => Some(4),
        _ => None,
    }
}

pub fn decay_chart(language: Language, section: Option<&str>) -> DecayChart {
    let text = locale::chart_text(language);
    let points = DECAY
        .iter()
        .zip(text.labels.iter())
        .map(|(&(wood, steel, stone), name)| ChartPoint { name: name.to_string(), wood, steel, stone })
        .collect();
    DecayChart {
        language,
        y_axis: text.y_axis.to_string(),
        datasets: ChartDatasets {
            wood: text.wood.to_string(),
            steel: text.steel.to_string(),
            stone: text.stone.to_string(),
        },
        points,
        highlight: section.and_then(section_index),
    }
}
