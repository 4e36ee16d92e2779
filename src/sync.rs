use anyhow::{Context, Result};
use reqwest::blocking::Client;
use rusqlite::Connection;
use tracing::info;

use crate::db::{self, AblaufRow};
use crate::enrich;
use crate::extract;
use crate::fetch;
use crate::mapper;
use crate::vocab::Vocab;

/// Sync one Ablauf page and amend its positions afterwards. `Ok(None)`
/// covers every "nothing to ingest" outcome: already closed and not forced,
/// no embedded payload, blank title.
pub fn process_ablauf(
    conn: &Connection,
    client: &Client,
    vocab: &Vocab,
    url: &str,
    force: bool,
) -> Result<Option<AblaufRow>> {
    let Some(ablauf) = sync_ablauf(conn, client, vocab, url, force)? else {
        return Ok(None);
    };
    enrich::extend_positions(conn, url)?;
    Ok(Some(ablauf))
}

pub fn sync_ablauf(
    conn: &Connection,
    client: &Client,
    vocab: &Vocab,
    url: &str,
    force: bool,
) -> Result<Option<AblaufRow>> {
    if !force {
        if let Some(existing) = db::find_ablauf(conn, url)? {
            if existing.abgeschlossen {
                info!("Skipping finished Ablauf: {}", url);
                return Ok(None);
            }
        }
    }

    let page = fetch::fetch(client, url)?;
    ingest(conn, vocab, url, &page)
}

/// Replace the stored record set of one Ablauf with what its page carries
/// right now.
///
/// The whole replace runs in one transaction, with the Ablauf row written
/// last: a reader never sees a procedure whose derived rows belong to a
/// half-cleared generation, and a failure rolls back to the previous one.
pub fn ingest(
    conn: &Connection,
    vocab: &Vocab,
    url: &str,
    page: &[u8],
) -> Result<Option<AblaufRow>> {
    let key = ablauf_key(url)?;

    let Some(doc) = extract::inline_xml_from_page(page, url) else {
        info!("No content: {}", url);
        return Ok(None);
    };

    // Person lookups run during mapping, before the write transaction.
    let Some(mapped) = mapper::map_document(&doc, url, key, conn, vocab) else {
        info!("No title: {}", url);
        return Ok(None);
    };

    let tx = conn.unchecked_transaction()?;
    db::delete_derived(&tx, url)?;
    for p in &mapped.positionen {
        db::insert_position(&tx, &p.position)?;
        for z in &p.zuweisungen {
            db::insert_zuweisung(&tx, z)?;
        }
        for b in &p.beschluesse {
            db::insert_beschluss(&tx, b)?;
        }
        if let Some(r) = &p.referenz {
            db::insert_referenz(&tx, r)?;
        }
        for b in &p.beitraege {
            db::insert_beitrag(&tx, b)?;
        }
    }
    for r in &mapped.referenzen {
        db::upsert_referenz(&tx, r)?;
    }
    for wort in &mapped.schlagworte {
        db::upsert_schlagwort(&tx, wort, url)?;
    }
    db::upsert_ablauf(&tx, &mapped.ablauf)?;
    tx.commit()?;

    Ok(Some(mapped.ablauf))
}

/// The numeric Ablauf key is the page's filename stem.
fn ablauf_key(url: &str) -> Result<i64> {
    let stem = url
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .split('.')
        .next()
        .unwrap_or_default();
    stem.parse::<i64>()
        .with_context(|| format!("No numeric Ablauf key in {}", url))
}

// ── Tests ──
