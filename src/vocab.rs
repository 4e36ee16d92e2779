use std::collections::HashMap;

/// Wahlperioden covered by the extrakt index, ascending.
pub const WAHLPERIODEN: [i64; 2] = [17, 18];

/// Everything older than the current Wahlperiode is treated as closed no
/// matter what its status text says.
pub const AKTUELLE_WAHLPERIODE: i64 = WAHLPERIODEN[WAHLPERIODEN.len() - 1];

// Faction spellings in the payloads vary; map them to one canonical form.
const FRAKTION_MAPS: &[(&str, &str)] = &[
    ("BÜNDNIS 90/DIE GRÜNEN", "B90/GRÜNE"),
    ("Bündnis 90/Die Grünen", "B90/GRÜNE"),
    ("DIE LINKE.", "DIE LINKE"),
    ("Die Linke", "DIE LINKE"),
    ("F.D.P.", "FDP"),
    ("fraktionslos", "Fraktionslos"),
];

const GREMIUM_TO_KEY: &[(&str, &str)] = &[
    ("Petitionsausschuss", "a02"),
    ("Auswärtiger Ausschuss", "a03"),
    ("Innenausschuss", "a04"),
    ("Sportausschuss", "a05"),
    ("Rechtsausschuss", "a06"),
    ("Finanzausschuss", "a07"),
    ("Haushaltsausschuss", "a08"),
    ("Ausschuss für Wirtschaft und Technologie", "a09"),
    ("Ausschuss für Ernährung, Landwirtschaft und Verbraucherschutz", "a10"),
    ("Ausschuss für Arbeit und Soziales", "a11"),
    ("Verteidigungsausschuss", "a12"),
    ("Ausschuss für Familie, Senioren, Frauen und Jugend", "a13"),
    ("Ausschuss für Gesundheit", "a14"),
    ("Ausschuss für Verkehr, Bau und Stadtentwicklung", "a15"),
    ("Ausschuss für Umwelt, Naturschutz und Reaktorsicherheit", "a16"),
    ("Ausschuss für Menschenrechte und humanitäre Hilfe", "a17"),
    ("Ausschuss für Bildung, Forschung und Technikfolgenabschätzung", "a18"),
    ("Ausschuss für wirtschaftliche Zusammenarbeit und Entwicklung", "a19"),
    ("Ausschuss für Tourismus", "a20"),
    ("Ausschuss für die Angelegenheiten der Europäischen Union", "a21"),
    ("Ausschuss für Kultur und Medien", "a22"),
];

// AKTUELLER_STAND values that end a Vorgang. Anything unlisted counts as
// still open.
const STAENDE_ABGESCHLOSSEN: &[(&str, bool)] = &[
    ("Verkündet", true),
    ("Abgeschlossen - Ergebnis siehe Vorgangsablauf", true),
    ("Erledigt durch Ablauf der Wahlperiode (Diskontinuität)", true),
    ("Zurückgezogen", true),
    ("Für erledigt erklärt", true),
    ("Für nichtig erklärt", true),
    ("Abgelehnt", true),
    ("Dem Bundestag zugeleitet - Noch nicht beraten", false),
    ("Noch nicht beraten", false),
    ("Überwiesen", false),
    ("Beschlussempfehlung liegt vor", false),
    ("1. Durchgang abgeschlossen", false),
];

/// Read-only lookup tables consumed by the mapper. Injected rather than
/// ambient so tests can substitute fixtures.
pub struct Vocab {
    fraktionen: HashMap<String, String>,
    gremien: HashMap<String, String>,
    staende: HashMap<String, bool>,
}

impl Default for Vocab {
    fn default() -> Self {
        Vocab::new(FRAKTION_MAPS, GREMIUM_TO_KEY, STAENDE_ABGESCHLOSSEN)
    }
}

impl Vocab {
    pub fn new(
        fraktionen: &[(&str, &str)],
        gremien: &[(&str, &str)],
        staende: &[(&str, bool)],
    ) -> Self {
        Vocab {
            fraktionen: fraktionen
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            gremien: gremien
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            staende: staende.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    /// Canonical faction name; unknown spellings pass through unchanged.
    pub fn fraktion(&self, raw: &str) -> String {
        self.fraktionen
            .get(raw)
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }

    pub fn gremium_key(&self, klartext: &str) -> Option<String> {
        self.gremien.get(klartext).cloned()
    }

    pub fn ist_abgeschlossen(&self, stand: &str) -> bool {
        self.staende.get(stand).copied().unwrap_or(false)
    }
}

// ── Tests ──
