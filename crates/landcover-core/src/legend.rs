//! Class legend of the land-cover classification (collection 8): class
//! code → human label and display colour.

use serde::Serialize;

/// Highest class code the display palette stretches over (min 0, max 62).
pub const PALETTE_MAX: u16 = 62;

/// Colour of codes that carry no class.
const UNCLASSIFIED_HEX: &str = "#ffffff";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassInfo {
    pub code: u16,
    pub name: &'static str,
    /// `#rrggbb`
    pub color: &'static str,
}

const fn class(code: u16, name: &'static str, color: &'static str) -> ClassInfo {
    ClassInfo { code, name, color }
}

/// Collection 8 legend, in legend order.
const CLASSES: &[ClassInfo] = &[
    class(1, "Floresta", "#32a65e"),
    class(3, "Formação Florestal", "#1f8d49"),
    class(4, "Formação Savânica", "#7dc975"),
    class(5, "Mangue", "#04381d"),
    class(6, "Floresta Alagável", "#026975"),
    class(49, "Restinga Arbórea", "#02d659"),
    class(10, "Formação Natural não Florestal", "#ad975a"),
    class(11, "Campo Alagado e Área Pantanosa", "#519799"),
    class(12, "Formação Campestre", "#d6bc74"),
    class(32, "Apicum", "#fc8114"),
    class(29, "Afloramento Rochoso", "#ffaa5f"),
    class(50, "Restinga Herbácea", "#ad5100"),
    class(13, "Outras Formações não Florestais", "#d89f5c"),
    class(14, "Agropecuária", "#ffefc3"),
    class(15, "Pastagem", "#edde8e"),
    class(18, "Agricultura", "#e974ed"),
    class(19, "Lavoura Temporária", "#c27ba0"),
    class(39, "Soja", "#f5b3c8"),
    class(20, "Cana", "#db7093"),
    class(40, "Arroz", "#c71585"),
    class(62, "Algodão", "#ff69b4"),
    class(41, "Outras Lavouras Temporárias", "#f54ca9"),
    class(36, "Lavoura Perene", "#d082de"),
    class(46, "Café", "#d68fe2"),
    class(47, "Citrus", "#9932cc"),
    class(35, "Dendê", "#9065d0"),
    class(48, "Outras Lavouras Perenes", "#e6ccff"),
    class(9, "Silvicultura", "#7a5900"),
    class(21, "Mosaico de Usos", "#ffefc3"),
    class(22, "Área não Vegetada", "#d4271e"),
    class(23, "Praia, Duna e Areal", "#ffa07a"),
    class(24, "Área Urbanizada", "#d4271e"),
    class(30, "Mineração", "#9c0027"),
    class(25, "Outras Áreas não Vegetadas", "#db4d4f"),
    class(26, "Corpo D'água", "#2532e4"),
    class(33, "Rio, Lago e Oceano", "#2532e4"),
    class(31, "Aquicultura", "#091077"),
    class(27, "Não Observado", "#ffffff"),
];

/// Lookup from class code to label and colour.
#[derive(Debug, Clone)]
pub struct Legend {
    classes: Vec<ClassInfo>,
}

impl Default for Legend {
    fn default() -> Self {
        Self { classes: CLASSES.to_vec() }
    }
}

impl Legend {
    pub fn new(classes: Vec<ClassInfo>) -> Self {
        Self { classes }
    }

    pub fn classes(&self) -> &[ClassInfo] {
        &self.classes
    }

    pub fn get(&self, code: u16) -> Option<&ClassInfo> {
        self.classes.iter().find(|c| c.code == code)
    }

    /// Human label of a class; None for codes outside the legend.
    pub fn label(&self, code: u16) -> Option<&'static str> {
        self.get(code).map(|c| c.name)
    }

    pub fn color_for_label(&self, label: &str) -> Option<&'static str> {
        self.classes.iter().find(|c| c.name == label).map(|c| c.color)
    }

    /// Display palette indexed by class code, `0..=PALETTE_MAX`.
    /// Codes without a class get white.
    pub fn palette(&self) -> Vec<[u8; 3]> {
        (0..=PALETTE_MAX)
            .map(|code| {
                let hex = self.get(code).map_or(UNCLASSIFIED_HEX, |c| c.color);
                parse_hex(hex).unwrap_or([255, 255, 255])
            })
            .collect()
    }
}

/// Parse `#rrggbb`.
pub fn parse_hex(hex: &str) -> Option<[u8; 3]> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}
