use std::sync::LazyLock;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use rusqlite::Connection;
use sha1::{Digest, Sha1};
use tracing::info;

use crate::db::{self, StoredPosition};

// "Gesetzentwurf, Urheber : Bundesregierung" → the marker up to the colon
// is noise in front of the actual source.
static URHEBER_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^.*Urheber.*:").unwrap());

const BUNDESREGIERUNG_PREFIX: &str = "Bundesregierung, ";

/// Derive the normalized columns on every stored position of one Ablauf.
///
/// A malformed Fundstelle date is fatal for the whole pass: ordering and
/// identity downstream depend on it.
pub fn extend_positions(conn: &Connection, source_url: &str) -> Result<()> {
    info!("Amending positions ...");
    for pos in db::find_positionen(conn, source_url)? {
        extend_position(conn, &pos)
            .with_context(|| format!("Failed to amend position {} of {}", pos.id, source_url))?;
    }
    Ok(())
}

fn extend_position(conn: &Connection, pos: &StoredPosition) -> Result<()> {
    let fundstelle = pos
        .fundstelle
        .as_deref()
        .ok_or_else(|| anyhow!("position has no Fundstelle"))?;

    let (dt, _rest) = fundstelle
        .split_once('-')
        .ok_or_else(|| anyhow!("Fundstelle {:?} has no date part", fundstelle))?;
    let date = NaiveDate::parse_from_str(dt.trim(), "%d.%m.%Y")
        .with_context(|| format!("Bad date in Fundstelle {:?}", fundstelle))?;

    let raw_urheber = pos.urheber.clone().unwrap_or_default();
    let (typ, quelle) = match raw_urheber.split_once(',') {
        Some((typ, rest)) => {
            let quelle = URHEBER_MARKER_RE.replace(rest, "").trim().to_string();
            (typ.trim().to_string(), Some(quelle))
        }
        None => (raw_urheber.clone(), None),
    };

    let urheber = raw_urheber
        .strip_prefix(BUNDESREGIERUNG_PREFIX)
        .unwrap_or(&raw_urheber)
        .to_string();

    // Only protocol citations get a document flag: the link minus fragment.
    let fundstelle_doc = pos
        .fundstelle_url
        .as_deref()
        .filter(|u| u.contains("btp"))
        .map(|u| u.rsplit_once('#').map_or(u, |(base, _)| base).to_string());

    let hash = identity_hash(fundstelle, &urheber, &pos.source_url);

    db::update_position_enrichment(
        conn,
        pos.id,
        &date.format("%Y-%m-%d").to_string(),
        &typ,
        quelle.as_deref(),
        &urheber,
        fundstelle_doc.as_deref(),
        &hash,
    )
}

/// Stable, order-independent position identity: 10 hex chars of SHA-1 over
/// (Fundstelle, Urheber, owning URL).
fn identity_hash(fundstelle: &str, urheber: &str, source_url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(fundstelle.as_bytes());
    hasher.update(urheber.as_bytes());
    hasher.update(source_url.as_bytes());
    hasher
        .finalize()
        .iter()
        .take(5)
        .map(|b| format!("{:02x}", b))
        .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::PositionRow;

    const URL: &str = "http://dipbt.bundestag.de/extrakt/ba/WP17/40001.html";

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    fn insert(conn: &Connection, urheber: &str, fundstelle: &str, url: Option<&str>) {
        db::insert_position(
            conn,
            &PositionRow {
                source_url: URL.to_string(),
                urheber: Some(urheber.to_string()),
                fundstelle: Some(fundstelle.to_string()),
                zuordnung: None,
                abstrakt: None,
                fundstelle_url: url.map(String::from),
            },
        )
        .unwrap();
    }

    fn single(conn: &Connection) -> StoredPosition {
        let mut rows = db::find_positionen(conn, URL).unwrap();
        assert_eq!(rows.len(), 1);
        rows.pop().unwrap()
    }

    #[test]
    fn date_and_urheber_split() {
        let conn = test_conn();
        insert(
            &conn,
            "Gesetzentwurf, Urheber : Bundesregierung",
            "05.03.2012 - BT-Drucksache 17/112",
            None,
        );
        extend_positions(&conn, URL).unwrap();

        let p = single(&conn);
        assert_eq!(p.date.as_deref(), Some("2012-03-05"));
        assert_eq!(p.typ.as_deref(), Some("Gesetzentwurf"));
        assert_eq!(p.quelle.as_deref(), Some("Bundesregierung"));
        assert_eq!(p.hash.as_ref().unwrap().len(), 10);
    }

    #[test]
    fn bundesregierung_prefix_is_stripped() {
        let conn = test_conn();
        insert(
            &conn,
            "Bundesregierung, Auswärtiges Amt",
            "23.03.2012 - BT-Plenarprotokoll 17/42",
            None,
        );
        extend_positions(&conn, URL).unwrap();

        let p = single(&conn);
        assert_eq!(p.urheber.as_deref(), Some("Auswärtiges Amt"));
        assert_eq!(p.typ.as_deref(), Some("Bundesregierung"));
        assert_eq!(p.quelle.as_deref(), Some("Auswärtiges Amt"));
    }

    #[test]
    fn urheber_without_comma_is_the_typ() {
        let conn = test_conn();
        insert(&conn, "Gesetzentwurf", "05.03.2012 - x", None);
        extend_positions(&conn, URL).unwrap();

        let p = single(&conn);
        assert_eq!(p.typ.as_deref(), Some("Gesetzentwurf"));
        assert!(p.quelle.is_none());
    }

    #[test]
    fn fundstelle_doc_only_for_protocol_links() {
        let conn = test_conn();
        insert(
            &conn,
            "A",
            "23.03.2012 - x",
            Some("http://dipbt.bundestag.de:80/dip21/btp/17/17042.pdf#P.4123"),
        );
        extend_positions(&conn, URL).unwrap();
        assert_eq!(
            single(&conn).fundstelle_doc.as_deref(),
            Some("http://dipbt.bundestag.de:80/dip21/btp/17/17042.pdf")
        );

        let conn = test_conn();
        insert(
            &conn,
            "A",
            "05.03.2012 - x",
            Some("http://dipbt.bundestag.de:80/dip21/btd/17/001/1700112.pdf"),
        );
        extend_positions(&conn, URL).unwrap();
        assert!(single(&conn).fundstelle_doc.is_none());
    }

    #[test]
    fn malformed_date_is_fatal_for_the_pass() {
        let conn = test_conn();
        insert(&conn, "A", "irgendwann 2012", None);
        assert!(extend_positions(&conn, URL).is_err());

        let conn = test_conn();
        insert(&conn, "A", "31.02.2012 - x", None);
        assert!(extend_positions(&conn, URL).is_err());
    }

    #[test]
    fn hash_depends_on_exactly_fundstelle_urheber_and_url() {
        let base = identity_hash("05.03.2012 - BT-Drucksache 17/112", "Gesetzentwurf", URL);
        assert_eq!(base.len(), 10);
        assert_eq!(
            base,
            identity_hash("05.03.2012 - BT-Drucksache 17/112", "Gesetzentwurf", URL)
        );
        assert_ne!(
            base,
            identity_hash("05.03.2012 - BT-Drucksache 17/113", "Gesetzentwurf", URL)
        );
        assert_ne!(
            base,
            identity_hash("05.03.2012 - BT-Drucksache 17/112", "Antrag", URL)
        );
        assert_ne!(
            base,
            identity_hash("05.03.2012 - BT-Drucksache 17/112", "Gesetzentwurf", "http://anders")
        );
    }
}
