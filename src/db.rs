use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::mapper::PersonLookup;

const DEFAULT_DB_PATH: &str = "data/dip.sqlite";

pub fn path() -> PathBuf {
    env::var("DIP_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH))
}

pub fn connect() -> Result<Connection> {
    let p = path();
    let conn = Connection::open(&p).with_context(|| format!("Failed to open {:?}", p))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

// No FOREIGN KEY from derived rows to ablaeufe: the Ablauf row is written
// last within a sync transaction, after its derived rows.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS ablaeufe (
            source_url  TEXT PRIMARY KEY,
            key         INTEGER NOT NULL,
            wahlperiode INTEGER,
            typ         TEXT,
            titel       TEXT NOT NULL,
            initiative  TEXT,
            stand       TEXT,
            signatur    TEXT,
            gesta_id    TEXT,
            eu_dok_nr   TEXT,
            abstrakt    TEXT,
            sachgebiet  TEXT,
            zustimmungsbeduerftig TEXT,
            abgeschlossen BOOLEAN NOT NULL DEFAULT 0,
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS positionen (
            id             INTEGER PRIMARY KEY,
            source_url     TEXT NOT NULL,
            urheber        TEXT,
            fundstelle     TEXT,
            zuordnung      TEXT,
            abstrakt       TEXT,
            fundstelle_url TEXT,
            date           TEXT,
            typ            TEXT,
            quelle         TEXT,
            fundstelle_doc TEXT,
            hash           TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_positionen_source ON positionen(source_url);

        CREATE TABLE IF NOT EXISTS zuweisungen (
            id            INTEGER PRIMARY KEY,
            source_url    TEXT NOT NULL,
            urheber       TEXT,
            fundstelle    TEXT,
            text          TEXT,
            federfuehrung BOOLEAN NOT NULL DEFAULT 0,
            gremium_key   TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_zuweisungen_source ON zuweisungen(source_url);

        CREATE TABLE IF NOT EXISTS beschluesse (
            id            INTEGER PRIMARY KEY,
            source_url    TEXT NOT NULL,
            urheber       TEXT,
            fundstelle    TEXT,
            seite         TEXT,
            dokument_text TEXT,
            tenor         TEXT,
            grundlage     TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_beschluesse_source ON beschluesse(source_url);

        CREATE TABLE IF NOT EXISTS referenzen (
            id         INTEGER PRIMARY KEY,
            source_url TEXT NOT NULL,
            urheber    TEXT,
            fundstelle TEXT,
            hrsg       TEXT NOT NULL,
            typ        TEXT NOT NULL,
            nummer     TEXT NOT NULL,
            link       TEXT,
            text       TEXT,
            seiten     TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_referenzen_source ON referenzen(source_url);

        CREATE TABLE IF NOT EXISTS beitraege (
            id                INTEGER PRIMARY KEY,
            source_url        TEXT NOT NULL,
            urheber           TEXT,
            fundstelle        TEXT,
            vorname           TEXT,
            nachname          TEXT,
            funktion          TEXT,
            ort               TEXT,
            ressort           TEXT,
            land              TEXT,
            fraktion          TEXT,
            seite             TEXT,
            art               TEXT,
            person_source_url TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_beitraege_source ON beitraege(source_url);

        CREATE TABLE IF NOT EXISTS schlagworte (
            wort       TEXT NOT NULL,
            source_url TEXT NOT NULL,
            UNIQUE(wort, source_url)
        );

        -- Written by the out-of-scope contributor matcher; read-only here.
        CREATE TABLE IF NOT EXISTS personen (
            fingerprint TEXT PRIMARY KEY,
            slug        TEXT,
            source_url  TEXT,
            vorname     TEXT,
            nachname    TEXT,
            ort         TEXT,
            ressort     TEXT,
            land        TEXT,
            fraktion    TEXT
        );
        ",
    )?;
    Ok(())
}

// ── Rows ──

#[derive(Debug, Clone, PartialEq)]
pub struct AblaufRow {
    pub source_url: String,
    pub key: i64,
    pub wahlperiode: Option<i64>,
    pub typ: Option<String>,
    pub titel: String,
    pub initiative: Option<String>,
    pub stand: Option<String>,
    pub signatur: Option<String>,
    pub gesta_id: Option<String>,
    pub eu_dok_nr: Option<String>,
    pub abstrakt: Option<String>,
    pub sachgebiet: Option<String>,
    pub zustimmungsbeduerftig: Option<String>,
    pub abgeschlossen: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionRow {
    pub source_url: String,
    pub urheber: Option<String>,
    pub fundstelle: Option<String>,
    pub zuordnung: Option<String>,
    pub abstrakt: Option<String>,
    pub fundstelle_url: Option<String>,
}

/// A position as stored, including the enricher's derived columns.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPosition {
    pub id: i64,
    pub source_url: String,
    pub urheber: Option<String>,
    pub fundstelle: Option<String>,
    pub fundstelle_url: Option<String>,
    pub date: Option<String>,
    pub typ: Option<String>,
    pub quelle: Option<String>,
    pub fundstelle_doc: Option<String>,
    pub hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZuweisungRow {
    pub source_url: String,
    pub urheber: Option<String>,
    pub fundstelle: Option<String>,
    pub text: Option<String>,
    pub federfuehrung: bool,
    pub gremium_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeschlussRow {
    pub source_url: String,
    pub urheber: Option<String>,
    pub fundstelle: Option<String>,
    pub seite: Option<String>,
    pub dokument_text: Option<String>,
    pub tenor: Option<String>,
    pub grundlage: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenzRow {
    pub source_url: String,
    pub urheber: Option<String>,
    pub fundstelle: Option<String>,
    pub hrsg: String,
    pub typ: String,
    pub nummer: String,
    pub link: Option<String>,
    pub text: Option<String>,
    pub seiten: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeitragRow {
    pub source_url: String,
    pub urheber: Option<String>,
    pub fundstelle: Option<String>,
    pub vorname: Option<String>,
    pub nachname: Option<String>,
    pub funktion: Option<String>,
    pub ort: Option<String>,
    pub ressort: Option<String>,
    pub land: Option<String>,
    pub fraktion: Option<String>,
    pub seite: Option<String>,
    pub art: Option<String>,
    pub person_source_url: Option<String>,
}

// ── Ablauf ──

pub fn find_ablauf(conn: &Connection, source_url: &str) -> Result<Option<AblaufRow>> {
    let row = conn
        .query_row(
            "SELECT source_url, key, wahlperiode, typ, titel, initiative, stand,
                    signatur, gesta_id, eu_dok_nr, abstrakt, sachgebiet,
                    zustimmungsbeduerftig, abgeschlossen
             FROM ablaeufe WHERE source_url = ?1",
            params![source_url],
            |row| {
                Ok(AblaufRow {
                    source_url: row.get(0)?,
                    key: row.get(1)?,
                    wahlperiode: row.get(2)?,
                    typ: row.get(3)?,
                    titel: row.get(4)?,
                    initiative: row.get(5)?,
                    stand: row.get(6)?,
                    signatur: row.get(7)?,
                    gesta_id: row.get(8)?,
                    eu_dok_nr: row.get(9)?,
                    abstrakt: row.get(10)?,
                    sachgebiet: row.get(11)?,
                    zustimmungsbeduerftig: row.get(12)?,
                    abgeschlossen: row.get(13)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn upsert_ablauf(conn: &Connection, a: &AblaufRow) -> Result<()> {
    conn.execute(
        "INSERT INTO ablaeufe
            (source_url, key, wahlperiode, typ, titel, initiative, stand,
             signatur, gesta_id, eu_dok_nr, abstrakt, sachgebiet,
             zustimmungsbeduerftig, abgeschlossen, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,datetime('now'))
         ON CONFLICT(source_url) DO UPDATE SET
            key = excluded.key,
            wahlperiode = excluded.wahlperiode,
            typ = excluded.typ,
            titel = excluded.titel,
            initiative = excluded.initiative,
            stand = excluded.stand,
            signatur = excluded.signatur,
            gesta_id = excluded.gesta_id,
            eu_dok_nr = excluded.eu_dok_nr,
            abstrakt = excluded.abstrakt,
            sachgebiet = excluded.sachgebiet,
            zustimmungsbeduerftig = excluded.zustimmungsbeduerftig,
            abgeschlossen = excluded.abgeschlossen,
            updated_at = excluded.updated_at",
        params![
            a.source_url,
            a.key,
            a.wahlperiode,
            a.typ,
            a.titel,
            a.initiative,
            a.stand,
            a.signatur,
            a.gesta_id,
            a.eu_dok_nr,
            a.abstrakt,
            a.sachgebiet,
            a.zustimmungsbeduerftig,
            a.abgeschlossen,
        ],
    )?;
    Ok(())
}

// ── Derived rows ──

/// Clear every derived row of one scrape generation. Keywords survive
/// re-syncs and are not touched here.
pub fn delete_derived(conn: &Connection, source_url: &str) -> Result<()> {
    for table in [
        "positionen",
        "zuweisungen",
        "beschluesse",
        "referenzen",
        "beitraege",
    ] {
        conn.execute(
            &format!("DELETE FROM {} WHERE source_url = ?1", table),
            params![source_url],
        )?;
    }
    Ok(())
}

pub fn insert_position(conn: &Connection, p: &PositionRow) -> Result<()> {
    conn.execute(
        "INSERT INTO positionen
            (source_url, urheber, fundstelle, zuordnung, abstrakt, fundstelle_url)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            p.source_url,
            p.urheber,
            p.fundstelle,
            p.zuordnung,
            p.abstrakt,
            p.fundstelle_url,
        ],
    )?;
    Ok(())
}

pub fn insert_zuweisung(conn: &Connection, z: &ZuweisungRow) -> Result<()> {
    conn.execute(
        "INSERT INTO zuweisungen
            (source_url, urheber, fundstelle, text, federfuehrung, gremium_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            z.source_url,
            z.urheber,
            z.fundstelle,
            z.text,
            z.federfuehrung,
            z.gremium_key,
        ],
    )?;
    Ok(())
}

pub fn insert_beschluss(conn: &Connection, b: &BeschlussRow) -> Result<()> {
    conn.execute(
        "INSERT INTO beschluesse
            (source_url, urheber, fundstelle, seite, dokument_text, tenor, grundlage)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            b.source_url,
            b.urheber,
            b.fundstelle,
            b.seite,
            b.dokument_text,
            b.tenor,
            b.grundlage,
        ],
    )?;
    Ok(())
}

pub fn insert_referenz(conn: &Connection, r: &ReferenzRow) -> Result<()> {
    conn.execute(
        "INSERT INTO referenzen
            (source_url, urheber, fundstelle, hrsg, typ, nummer, link, text, seiten)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            r.source_url,
            r.urheber,
            r.fundstelle,
            r.hrsg,
            r.typ,
            r.nummer,
            r.link,
            r.text,
            r.seiten,
        ],
    )?;
    Ok(())
}

/// Upsert keyed on (link, source_url, seiten) so procedure-level references
/// can be re-inserted idempotently within and across sync passes. `IS`
/// comparison because link and seiten are nullable.
pub fn upsert_referenz(conn: &Connection, r: &ReferenzRow) -> Result<()> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM referenzen
             WHERE link IS ?1 AND source_url = ?2 AND seiten IS ?3",
            params![r.link, r.source_url, r.seiten],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE referenzen
                 SET urheber = ?1, fundstelle = ?2, hrsg = ?3, typ = ?4,
                     nummer = ?5, text = ?6
                 WHERE id = ?7",
                params![r.urheber, r.fundstelle, r.hrsg, r.typ, r.nummer, r.text, id],
            )?;
            Ok(())
        }
        None => insert_referenz(conn, r),
    }
}

pub fn insert_beitrag(conn: &Connection, b: &BeitragRow) -> Result<()> {
    conn.execute(
        "INSERT INTO beitraege
            (source_url, urheber, fundstelle, vorname, nachname, funktion, ort,
             ressort, land, fraktion, seite, art, person_source_url)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
        params![
            b.source_url,
            b.urheber,
            b.fundstelle,
            b.vorname,
            b.nachname,
            b.funktion,
            b.ort,
            b.ressort,
            b.land,
            b.fraktion,
            b.seite,
            b.art,
            b.person_source_url,
        ],
    )?;
    Ok(())
}

pub fn upsert_schlagwort(conn: &Connection, wort: &str, source_url: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schlagworte (wort, source_url) VALUES (?1, ?2)",
        params![wort, source_url],
    )?;
    Ok(())
}

// ── Enrichment ──

pub fn find_positionen(conn: &Connection, source_url: &str) -> Result<Vec<StoredPosition>> {
    let mut stmt = conn.prepare(
        "SELECT id, source_url, urheber, fundstelle, fundstelle_url,
                date, typ, quelle, fundstelle_doc, hash
         FROM positionen WHERE source_url = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![source_url], |row| {
            Ok(StoredPosition {
                id: row.get(0)?,
                source_url: row.get(1)?,
                urheber: row.get(2)?,
                fundstelle: row.get(3)?,
                fundstelle_url: row.get(4)?,
                date: row.get(5)?,
                typ: row.get(6)?,
                quelle: row.get(7)?,
                fundstelle_doc: row.get(8)?,
                hash: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[allow(clippy::too_many_arguments)]
pub fn update_position_enrichment(
    conn: &Connection,
    id: i64,
    date: &str,
    typ: &str,
    quelle: Option<&str>,
    urheber: &str,
    fundstelle_doc: Option<&str>,
    hash: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE positionen
         SET date = ?1, typ = ?2, quelle = ?3, urheber = ?4,
             fundstelle_doc = ?5, hash = ?6
         WHERE id = ?7",
        params![date, typ, quelle, urheber, fundstelle_doc, hash, id],
    )?;
    Ok(())
}

// ── Personen ──

pub fn find_person_url(
    conn: &Connection,
    vorname: Option<&str>,
    nachname: Option<&str>,
    ort: Option<&str>,
) -> Result<Option<String>> {
    let row = conn
        .query_row(
            "SELECT source_url FROM personen
             WHERE vorname IS ?1 AND nachname IS ?2 AND ort IS ?3",
            params![vorname, nachname, ort],
            |row| row.get(0),
        )
        .optional()?;
    Ok(row)
}

impl PersonLookup for Connection {
    fn person_source_url(
        &self,
        vorname: Option<&str>,
        nachname: Option<&str>,
        ort: Option<&str>,
    ) -> Option<String> {
        match find_person_url(self, vorname, nachname, ort) {
            Ok(url) => url,
            Err(e) => {
                warn!("Person lookup failed: {}", e);
                None
            }
        }
    }
}

// ── Stats ──

pub struct Stats {
    pub ablaeufe: usize,
    pub abgeschlossen: usize,
    pub positionen: usize,
    pub zuweisungen: usize,
    pub beschluesse: usize,
    pub referenzen: usize,
    pub beitraege: usize,
    pub schlagworte: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> {
        Ok(conn.query_row(sql, [], |r| r.get(0))?)
    };
    Ok(Stats {
        ablaeufe: count("SELECT COUNT(*) FROM ablaeufe")?,
        abgeschlossen: count("SELECT COUNT(*) FROM ablaeufe WHERE abgeschlossen = 1")?,
        positionen: count("SELECT COUNT(*) FROM positionen")?,
        zuweisungen: count("SELECT COUNT(*) FROM zuweisungen")?,
        beschluesse: count("SELECT COUNT(*) FROM beschluesse")?,
        referenzen: count("SELECT COUNT(*) FROM referenzen")?,
        beitraege: count("SELECT COUNT(*) FROM beitraege")?,
        schlagworte: count("SELECT COUNT(*) FROM schlagworte")?,
    })
}

// ── Tests ──
