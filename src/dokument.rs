use thiserror::Error;
use tracing::warn;

/// Issuing body of a referenced document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Herausgeber {
    /// Bundestag
    Bt,
    /// Bundesrat
    Br,
}

impl Herausgeber {
    pub fn as_str(self) -> &'static str {
        match self {
            Herausgeber::Bt => "BT",
            Herausgeber::Br => "BR",
        }
    }

    fn parse(s: &str) -> Result<Self, DokumentError> {
        match s.trim() {
            "BT" => Ok(Herausgeber::Bt),
            "BR" => Ok(Herausgeber::Br),
            other => Err(DokumentError::UnknownHerausgeber(other.to_string())),
        }
    }
}

/// Document kind: Drucksache (bill/paper) or Plenarprotokoll (floor protocol).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DokTyp {
    Drucksache,
    Plenarprotokoll,
}

impl DokTyp {
    pub fn as_str(self) -> &'static str {
        match self {
            DokTyp::Drucksache => "drs",
            DokTyp::Plenarprotokoll => "plpr",
        }
    }
}

/// Canonical reference shape all citation formats resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dokument {
    pub hrsg: Herausgeber,
    pub typ: DokTyp,
    pub nummer: String,
    pub link: Option<String>,
}

#[derive(Debug, Error)]
pub enum DokumentError {
    #[error("unknown issuing body {0:?}")]
    UnknownHerausgeber(String),
    #[error("unknown path token in document url {0:?}")]
    UnknownPathToken(String),
    #[error("unparseable document url {0:?}")]
    MalformedUrl(String),
    #[error("unparseable document label {0:?}")]
    MalformedName(String),
}

/// The three citation encodings found in extrakt payloads. Callers try
/// [`Citation::Url`] before [`Citation::Name`]; [`Citation::Triple`] carries
/// discrete fields from structured sub-elements.
#[derive(Debug)]
pub enum Citation<'a> {
    Triple {
        hrsg: &'a str,
        typ: DokTyp,
        nummer: &'a str,
        link: Option<String>,
    },
    Url(&'a str),
    Name(&'a str),
}

// Leading URL path token → (issuer, kind).
const URL_TOKENS: [(&str, Herausgeber, DokTyp); 4] = [
    ("btd", Herausgeber::Bt, DokTyp::Drucksache),
    ("btp", Herausgeber::Bt, DokTyp::Plenarprotokoll),
    ("brd", Herausgeber::Br, DokTyp::Drucksache),
    ("brp", Herausgeber::Br, DokTyp::Plenarprotokoll),
];

// Display-name label → (issuer, kind).
const NAME_LABELS: [(&str, Herausgeber, DokTyp); 4] = [
    ("BT-Drucksache", Herausgeber::Bt, DokTyp::Drucksache),
    ("BT-Plenarprotokoll", Herausgeber::Bt, DokTyp::Plenarprotokoll),
    ("BR-Drucksache", Herausgeber::Br, DokTyp::Drucksache),
    ("BR-Plenarprotokoll", Herausgeber::Br, DokTyp::Plenarprotokoll),
];

const BTD_PDF_BASE: &str = "http://dipbt.bundestag.de:80/dip21/btd";

/// Resolve any citation encoding into the canonical [`Dokument`] shape.
///
/// An empty URL or name yields `Ok(None)` (no citation present, not an
/// error). Malformed inputs are errors; containment is the caller's job.
pub fn resolve(citation: Citation<'_>) -> Result<Option<Dokument>, DokumentError> {
    match citation {
        Citation::Triple {
            hrsg,
            typ,
            nummer,
            link,
        } => by_id(hrsg, typ, nummer, link).map(Some),
        Citation::Url(url) if url.is_empty() => Ok(None),
        Citation::Url(url) => by_url(url).map(Some),
        Citation::Name(name) if name.is_empty() => Ok(None),
        Citation::Name(name) => by_name(name).map(Some),
    }
}

fn by_id(
    hrsg: &str,
    typ: DokTyp,
    nummer: &str,
    link: Option<String>,
) -> Result<Dokument, DokumentError> {
    Ok(Dokument {
        hrsg: Herausgeber::parse(hrsg)?,
        typ,
        nummer: normalize_nummer(nummer),
        link,
    })
}

/// Strip leading zeros; section/part numbers get each side stripped
/// independently and rejoined.
fn normalize_nummer(nummer: &str) -> String {
    match nummer.split_once('/') {
        Some((section, rest)) => format!(
            "{}/{}",
            section.trim_start_matches('0'),
            rest.trim_start_matches('0')
        ),
        None => nummer.trim_start_matches('0').to_string(),
    }
}

fn by_url(url: &str) -> Result<Dokument, DokumentError> {
    // A trailing fragment is dropped and not otherwise used here.
    let url = url.split('#').next().unwrap_or(url);

    let (stem, _ext) = url
        .rsplit_once('.')
        .ok_or_else(|| DokumentError::MalformedUrl(url.to_string()))?;
    let tail = stem.splitn(5, '/').last().unwrap_or(stem);
    let base: Vec<&str> = tail.split('/').collect();

    let token = base.first().copied().unwrap_or_default();
    let (_, hrsg, typ) = URL_TOKENS
        .iter()
        .find(|(t, _, _)| *t == token)
        .ok_or_else(|| DokumentError::UnknownPathToken(url.to_string()))?;

    let nummer = match (hrsg, typ) {
        (Herausgeber::Br, DokTyp::Plenarprotokoll) => base
            .get(1)
            .ok_or_else(|| DokumentError::MalformedUrl(url.to_string()))?
            .to_string(),
        (Herausgeber::Br, DokTyp::Drucksache) => base
            .last()
            .unwrap_or(&"")
            .split('-')
            .collect::<Vec<_>>()
            .join("/"),
        (Herausgeber::Bt, _) => {
            // Filename repeats the session prefix: btd/17/001/1700112 → 17/112
            let session = base
                .get(1)
                .ok_or_else(|| DokumentError::MalformedUrl(url.to_string()))?;
            let file = base.last().unwrap_or(&"");
            let rest = file
                .get(session.len()..)
                .ok_or_else(|| DokumentError::MalformedUrl(url.to_string()))?;
            format!("{}/{}", session, rest.trim_start_matches('0'))
        }
    };

    Ok(Dokument {
        hrsg: *hrsg,
        typ: *typ,
        nummer,
        link: Some(url.to_string()),
    })
}

fn by_name(name: &str) -> Result<Dokument, DokumentError> {
    let mut rest = name;
    match rest.split_once(" - ") {
        Some((_date, r)) => rest = r,
        None => warn!("No date prefix in document label: {}", name),
    }

    // Anything from the first comma or newline on is trailing noise.
    if let Some(idx) = rest.find([',', '\n']) {
        rest = &rest[..idx];
    }

    let (label, nummer) = rest
        .trim()
        .split_once(' ')
        .ok_or_else(|| DokumentError::MalformedName(name.to_string()))?;

    let (hrsg, typ) = match NAME_LABELS.iter().find(|(l, _, _)| *l == label) {
        Some((_, h, t)) => (*h, *t),
        None => {
            warn!("Unknown document label {:?}, assuming BT-Drucksache", label);
            (Herausgeber::Bt, DokTyp::Drucksache)
        }
    };

    // Only name-resolved Drucksachen get a fabricated download link; every
    // other path copies a link it was given.
    let link = if hrsg == Herausgeber::Bt && typ == DokTyp::Drucksache {
        let (session, seq) = nummer
            .split_once('/')
            .ok_or_else(|| DokumentError::MalformedName(name.to_string()))?;
        let seq = seq.split(' ').next().unwrap_or(seq);
        let seq = format!("{:0>5}", seq);
        // Non-ASCII sequence parts would split mid-character here.
        let shelf = seq
            .get(..3)
            .ok_or_else(|| DokumentError::MalformedName(name.to_string()))?;
        Some(format!(
            "{}/{}/{}/{}{}.pdf",
            BTD_PDF_BASE, session, shelf, session, seq
        ))
    } else {
        None
    };

    Ok(Dokument {
        hrsg,
        typ,
        nummer: normalize_nummer(nummer),
        link,
    })
}

// ── Tests ──
