use tracing::{info, warn};

use crate::db::{
    AblaufRow, BeitragRow, BeschlussRow, PositionRow, ReferenzRow, ZuweisungRow,
};
use crate::dokument::{self, Citation, DokTyp, Dokument, DokumentError};
use crate::vocab::{Vocab, AKTUELLE_WAHLPERIODE};
use crate::xml::Element;

/// Best-effort resolution of contributors against known Person rows. A miss
/// is a normal outcome; the store owns the writes.
pub trait PersonLookup {
    fn person_source_url(
        &self,
        vorname: Option<&str>,
        nachname: Option<&str>,
        ort: Option<&str>,
    ) -> Option<String>;
}

/// Everything one parsed payload maps to, short of persisting it.
pub struct MappedAblauf {
    pub ablauf: AblaufRow,
    pub positionen: Vec<MappedPosition>,
    /// Procedure-level references (WICHTIGE_DRUCKSACHE, PLENUM); upserted.
    pub referenzen: Vec<ReferenzRow>,
    pub schlagworte: Vec<String>,
}

pub struct MappedPosition {
    pub position: PositionRow,
    pub zuweisungen: Vec<ZuweisungRow>,
    pub beschluesse: Vec<BeschlussRow>,
    pub beitraege: Vec<BeitragRow>,
    pub referenz: Option<ReferenzRow>,
}

/// Walk a parsed payload into the full derived record set.
///
/// Returns `None` when the mandatory title is blank — the caller treats
/// that as "nothing to ingest", same as a missing payload.
pub fn map_document(
    doc: &Element,
    url: &str,
    key: i64,
    persons: &dyn PersonLookup,
    vocab: &Vocab,
) -> Option<MappedAblauf> {
    let ablauf = map_ablauf(doc, url, key, vocab)?;

    let positionen = doc
        .descendants("VORGANGSPOSITION")
        .into_iter()
        .map(|elem| map_position(elem, url, persons, vocab))
        .collect();

    let mut referenzen = Vec::new();
    for elem in doc.find_all("WICHTIGE_DRUCKSACHE") {
        match map_drucksache(elem, url) {
            Ok(Some(r)) => referenzen.push(r),
            Ok(None) => {}
            Err(e) => warn!("Failed to resolve Drucksache on {}: {}", url, e),
        }
    }
    for elem in doc.find_all("PLENUM") {
        match map_plenum(elem, url) {
            Ok(Some(r)) => referenzen.push(r),
            Ok(None) => {}
            Err(e) => warn!("Failed to resolve Plenum on {}: {}", url, e),
        }
    }

    let schlagworte = doc
        .find_all("SCHLAGWORT")
        .into_iter()
        .map(|sw| sw.text.clone())
        .filter(|w| !w.trim().is_empty())
        .collect();

    Some(MappedAblauf {
        ablauf,
        positionen,
        referenzen,
        schlagworte,
    })
}

fn map_ablauf(doc: &Element, url: &str, key: i64, vocab: &Vocab) -> Option<AblaufRow> {
    let mut titel = doc.find_text("TITEL")?;
    if titel.trim().is_empty() {
        return None;
    }

    // Trailing EU document tag on its own line is not part of the title.
    if let Some((t, tag)) = titel.rsplit_once('\n') {
        let tag = tag.trim();
        if tag.starts_with("KOM") || tag.starts_with("SEK") {
            titel = t.to_string();
        }
    }

    info!("Ablauf {}: {}", url, titel);
    let titel = titel.trim().trim_start_matches('.').trim().to_string();

    let wahlperiode = doc
        .find_text("WAHLPERIODE")
        .and_then(|s| s.trim().parse::<i64>().ok());
    let stand = doc.find_text("AKTUELLER_STAND");

    let mut abgeschlossen = stand
        .as_deref()
        .map(|s| vocab.ist_abgeschlossen(s))
        .unwrap_or(false);
    if wahlperiode != Some(AKTUELLE_WAHLPERIODE) {
        abgeschlossen = true;
    }

    let mut abstrakt = doc.find_text("ABSTRAKT");
    if let Some(a) = &abstrakt {
        // Question procedures prefix the abstract with boilerplate.
        if let Some((_, original)) = a.split_once("Originaltext der Frage(n):") {
            abstrakt = Some(original.to_string());
        }
    }

    Some(AblaufRow {
        source_url: url.to_string(),
        key,
        wahlperiode,
        typ: doc.find_text("VORGANGSTYP"),
        titel,
        initiative: doc.find_text("INITIATIVE"),
        stand,
        signatur: doc.find_text("SIGNATUR"),
        gesta_id: doc.find_text("GESTA_ORDNUNGSNUMMER"),
        eu_dok_nr: doc.find_text("EU_DOK_NR"),
        abstrakt,
        sachgebiet: doc.find_text("SACHGEBIET"),
        zustimmungsbeduerftig: doc.find_text("ZUSTIMMUNGSBEDUERFTIGKEIT"),
        abgeschlossen,
    })
}

fn map_position(
    elem: &Element,
    url: &str,
    persons: &dyn PersonLookup,
    vocab: &Vocab,
) -> MappedPosition {
    let urheber = elem.find_text("URHEBER");
    let fundstelle = elem.find_text("FUNDSTELLE");

    let position = PositionRow {
        source_url: url.to_string(),
        urheber: urheber.clone(),
        fundstelle: fundstelle.clone(),
        zuordnung: elem.find_text("ZUORDNUNG"),
        abstrakt: elem.find_text("VP_ABSTRAKT"),
        fundstelle_url: elem.find_text("FUNDSTELLE_LINK"),
    };

    let zuweisungen = elem
        .find_all("ZUWEISUNG")
        .into_iter()
        .map(|z| {
            let text = z.find_text("AUSSCHUSS_KLARTEXT");
            ZuweisungRow {
                source_url: url.to_string(),
                urheber: urheber.clone(),
                fundstelle: fundstelle.clone(),
                gremium_key: text.as_deref().and_then(|t| vocab.gremium_key(t)),
                federfuehrung: z.find("FEDERFUEHRUNG").is_some(),
                text,
            }
        })
        .collect();

    let beschluesse = elem
        .find_all("BESCHLUSS")
        .into_iter()
        .map(|b| BeschlussRow {
            source_url: url.to_string(),
            urheber: urheber.clone(),
            fundstelle: fundstelle.clone(),
            seite: b.find_text("BESCHLUSSSEITE"),
            dokument_text: b.find_text("BEZUGSDOKUMENT"),
            tenor: b.find_text("BESCHLUSSTENOR"),
            grundlage: b.find_text("GRUNDLAGE"),
        })
        .collect();

    // URL citation is authoritative; the display name is the fallback. A
    // failure skips only this reference, siblings are still written.
    let referenz = match resolve_fundstelle(
        position.fundstelle_url.as_deref(),
        fundstelle.as_deref(),
    ) {
        Ok(Some(d)) => Some(referenz_row(d, url, urheber.clone(), fundstelle.clone())),
        Ok(None) => None,
        Err(e) => {
            warn!("Failed to resolve Fundstelle on {}: {}", url, e);
            None
        }
    };

    let beitraege = elem
        .find_all("PERSOENLICHER_URHEBER")
        .into_iter()
        .map(|b| {
            let vorname = b.find_text("VORNAME");
            let nachname = b.find_text("NACHNAME");
            let ort = b.find_text("WAHLKREISZUSATZ");
            let person_source_url = persons.person_source_url(
                vorname.as_deref(),
                nachname.as_deref(),
                ort.as_deref(),
            );
            BeitragRow {
                source_url: url.to_string(),
                urheber: urheber.clone(),
                fundstelle: fundstelle.clone(),
                vorname,
                nachname,
                funktion: b.find_text("FUNKTION"),
                ort,
                ressort: b.find_text("RESSORT"),
                land: b.find_text("BUNDESLAND"),
                fraktion: b.find_text("FRAKTION").map(|f| vocab.fraktion(&f)),
                seite: b.find_text("SEITE"),
                art: b.find_text("AKTIVITAETSART"),
                person_source_url,
            }
        })
        .collect();

    MappedPosition {
        position,
        zuweisungen,
        beschluesse,
        beitraege,
        referenz,
    }
}

fn resolve_fundstelle(
    fundstelle_url: Option<&str>,
    fundstelle: Option<&str>,
) -> Result<Option<Dokument>, DokumentError> {
    if let Some(d) = dokument::resolve(Citation::Url(fundstelle_url.unwrap_or("")))? {
        return Ok(Some(d));
    }
    dokument::resolve(Citation::Name(fundstelle.unwrap_or("")))
}

fn referenz_row(
    d: Dokument,
    url: &str,
    urheber: Option<String>,
    fundstelle: Option<String>,
) -> ReferenzRow {
    ReferenzRow {
        source_url: url.to_string(),
        urheber,
        fundstelle,
        hrsg: d.hrsg.as_str().to_string(),
        typ: d.typ.as_str().to_string(),
        nummer: d.nummer,
        link: d.link,
        text: None,
        seiten: None,
    }
}

fn map_drucksache(elem: &Element, url: &str) -> Result<Option<ReferenzRow>, DokumentError> {
    let Some(nummer) = elem.find_text("DRS_NUMMER") else {
        return Ok(None);
    };
    // The fragment on a DRS link is a page qualifier, kept separately.
    let (link, seiten) = match elem.find_text("DRS_LINK") {
        Some(l) => match l.rsplit_once('#') {
            Some((base, frag)) => (Some(base.to_string()), Some(frag.to_string())),
            None => (Some(l), None),
        },
        None => (None, None),
    };

    let hrsg = elem.find_text("DRS_HERAUSGEBER").unwrap_or_default();
    let d = dokument::resolve(Citation::Triple {
        hrsg: &hrsg,
        typ: DokTyp::Drucksache,
        nummer: &nummer,
        link,
    })?;

    Ok(d.map(|d| ReferenzRow {
        text: elem.find_text("DRS_TYP"),
        seiten,
        ..referenz_row(d, url, None, None)
    }))
}

fn map_plenum(elem: &Element, url: &str) -> Result<Option<ReferenzRow>, DokumentError> {
    let Some(nummer) = elem.find_text("PLPR_NUMMER") else {
        return Ok(None);
    };
    // Fragment is dropped here; the page qualifier comes from PLPR_SEITEN.
    let link = elem.find_text("PLPR_LINK").map(|l| match l.rsplit_once('#') {
        Some((base, _)) => base.to_string(),
        None => l,
    });

    let hrsg = elem.find_text("PLPR_HERAUSGEBER").unwrap_or_default();
    let d = dokument::resolve(Citation::Triple {
        hrsg: &hrsg,
        typ: DokTyp::Plenarprotokoll,
        nummer: &nummer,
        link,
    })?;

    Ok(d.map(|d| ReferenzRow {
        text: elem.find_text("PLPR_KLARTEXT"),
        seiten: elem.find_text("PLPR_SEITEN"),
        ..referenz_row(d, url, None, None)
    }))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml;
    use std::collections::HashMap;

    const URL: &str = "http://dipbt.bundestag.de/extrakt/ba/WP17/40001.html";

    struct NoPersons;

    impl PersonLookup for NoPersons {
        fn person_source_url(&self, _: Option<&str>, _: Option<&str>, _: Option<&str>) -> Option<String> {
            None
        }
    }

    struct FixedPersons(HashMap<(String, String), String>);

    impl PersonLookup for FixedPersons {
        fn person_source_url(
            &self,
            vorname: Option<&str>,
            nachname: Option<&str>,
            _ort: Option<&str>,
        ) -> Option<String> {
            self.0
                .get(&(vorname?.to_string(), nachname?.to_string()))
                .cloned()
        }
    }

    fn map(xml_text: &str) -> Option<MappedAblauf> {
        let doc = xml::parse(xml_text).unwrap();
        map_document(&doc, URL, 40001, &NoPersons, &Vocab::default())
    }

    #[test]
    fn kom_tag_is_stripped_from_title() {
        let m = map(
            "<VORGANG><WAHLPERIODE>18</WAHLPERIODE><TITEL>Example Title\nKOM(2020)123</TITEL></VORGANG>",
        )
        .unwrap();
        assert_eq!(m.ablauf.titel, "Example Title");
    }

    #[test]
    fn plain_multiline_title_is_kept() {
        let m = map("<VORGANG><TITEL>Erster Teil\nZweiter Teil</TITEL></VORGANG>").unwrap();
        assert_eq!(m.ablauf.titel, "Erster Teil\nZweiter Teil");
    }

    #[test]
    fn leading_dot_and_whitespace_are_trimmed() {
        let m = map("<VORGANG><TITEL> .. Gesetz zur Beispielregelung </TITEL></VORGANG>").unwrap();
        assert_eq!(m.ablauf.titel, "Gesetz zur Beispielregelung");
    }

    #[test]
    fn blank_title_yields_none() {
        assert!(map("<VORGANG><TITEL>   </TITEL></VORGANG>").is_none());
        assert!(map("<VORGANG><WAHLPERIODE>17</WAHLPERIODE></VORGANG>").is_none());
    }

    #[test]
    fn question_preamble_is_cut_from_abstract() {
        let m = map(
            "<VORGANG><TITEL>T</TITEL><ABSTRAKT>Vorspann Originaltext der Frage(n): Wie ist der Stand?</ABSTRAKT></VORGANG>",
        )
        .unwrap();
        assert_eq!(m.ablauf.abstrakt.as_deref(), Some(" Wie ist der Stand?"));
    }

    #[test]
    fn prior_wahlperiode_forces_closed() {
        let m = map(
            "<VORGANG><WAHLPERIODE>17</WAHLPERIODE><TITEL>T</TITEL><AKTUELLER_STAND>Überwiesen</AKTUELLER_STAND></VORGANG>",
        )
        .unwrap();
        assert!(m.ablauf.abgeschlossen);

        let m = map(
            "<VORGANG><WAHLPERIODE>18</WAHLPERIODE><TITEL>T</TITEL><AKTUELLER_STAND>Überwiesen</AKTUELLER_STAND></VORGANG>",
        )
        .unwrap();
        assert!(!m.ablauf.abgeschlossen);
    }

    #[test]
    fn finished_stand_closes_current_wahlperiode() {
        let m = map(
            "<VORGANG><WAHLPERIODE>18</WAHLPERIODE><TITEL>T</TITEL><AKTUELLER_STAND>Verkündet</AKTUELLER_STAND></VORGANG>",
        )
        .unwrap();
        assert!(m.ablauf.abgeschlossen);
    }

    #[test]
    fn positions_are_found_at_any_depth() {
        let m = map(
            "<VORGANG><TITEL>T</TITEL><VORGANGSABLAUF>\
             <VORGANGSPOSITION><URHEBER>A</URHEBER></VORGANGSPOSITION>\
             <VORGANGSPOSITION><URHEBER>B</URHEBER></VORGANGSPOSITION>\
             </VORGANGSABLAUF></VORGANG>",
        )
        .unwrap();
        assert_eq!(m.positionen.len(), 2);
        assert_eq!(m.positionen[0].position.urheber.as_deref(), Some("A"));
    }

    #[test]
    fn zuweisung_maps_gremium_and_federfuehrung() {
        let m = map(
            "<VORGANG><TITEL>T</TITEL><VORGANGSPOSITION>\
             <ZUWEISUNG><AUSSCHUSS_KLARTEXT>Rechtsausschuss</AUSSCHUSS_KLARTEXT><FEDERFUEHRUNG/></ZUWEISUNG>\
             <ZUWEISUNG><AUSSCHUSS_KLARTEXT>Haushaltsausschuss</AUSSCHUSS_KLARTEXT></ZUWEISUNG>\
             </VORGANGSPOSITION></VORGANG>",
        )
        .unwrap();
        let z = &m.positionen[0].zuweisungen;
        assert_eq!(z.len(), 2);
        assert!(z[0].federfuehrung);
        assert_eq!(z[0].gremium_key.as_deref(), Some("a06"));
        assert!(!z[1].federfuehrung);
        assert_eq!(z[1].gremium_key.as_deref(), Some("a08"));
    }

    #[test]
    fn position_reference_prefers_url_over_name() {
        let m = map(
            "<VORGANG><TITEL>T</TITEL><VORGANGSPOSITION>\
             <FUNDSTELLE>05.03.2012 - BT-Drucksache 17/999</FUNDSTELLE>\
             <FUNDSTELLE_LINK>http://dipbt.bundestag.de:80/dip21/btd/17/001/1700112.pdf</FUNDSTELLE_LINK>\
             </VORGANGSPOSITION></VORGANG>",
        )
        .unwrap();
        let r = m.positionen[0].referenz.as_ref().unwrap();
        assert_eq!(r.nummer, "17/112");
    }

    #[test]
    fn position_reference_falls_back_to_name() {
        let m = map(
            "<VORGANG><TITEL>T</TITEL><VORGANGSPOSITION>\
             <FUNDSTELLE>12.03.2019 - BT-Drucksache 19/1234</FUNDSTELLE>\
             </VORGANGSPOSITION></VORGANG>",
        )
        .unwrap();
        let r = m.positionen[0].referenz.as_ref().unwrap();
        assert_eq!(r.nummer, "19/1234");
        assert_eq!(
            r.link.as_deref(),
            Some("http://dipbt.bundestag.de:80/dip21/btd/19/012/1901234.pdf")
        );
    }

    #[test]
    fn bad_reference_skips_only_the_reference() {
        let m = map(
            "<VORGANG><TITEL>T</TITEL><VORGANGSPOSITION>\
             <URHEBER>Gesetzentwurf</URHEBER>\
             <FUNDSTELLE_LINK>http://example.org/a/b/unbekannt/1/2.pdf</FUNDSTELLE_LINK>\
             <BESCHLUSS><BESCHLUSSTENOR>Annahme</BESCHLUSSTENOR></BESCHLUSS>\
             </VORGANGSPOSITION></VORGANG>",
        )
        .unwrap();
        assert!(m.positionen[0].referenz.is_none());
        assert_eq!(m.positionen[0].beschluesse.len(), 1);
    }

    #[test]
    fn beitrag_maps_fraktion_and_person_backref() {
        let mut persons = HashMap::new();
        persons.insert(
            ("Erika".to_string(), "Mustermann".to_string()),
            "http://example.org/p/1".to_string(),
        );
        let doc = xml::parse(
            "<VORGANG><TITEL>T</TITEL><VORGANGSPOSITION><PERSOENLICHER_URHEBER>\
             <VORNAME>Erika</VORNAME><NACHNAME>Mustermann</NACHNAME>\
             <FRAKTION>DIE LINKE.</FRAKTION><AKTIVITAETSART>Rede</AKTIVITAETSART>\
             </PERSOENLICHER_URHEBER></VORGANGSPOSITION></VORGANG>",
        )
        .unwrap();
        let m = map_document(&doc, URL, 40001, &FixedPersons(persons), &Vocab::default()).unwrap();
        let b = &m.positionen[0].beitraege[0];
        assert_eq!(b.fraktion.as_deref(), Some("DIE LINKE"));
        assert_eq!(b.person_source_url.as_deref(), Some("http://example.org/p/1"));
        assert_eq!(b.art.as_deref(), Some("Rede"));
    }

    #[test]
    fn drucksache_fragment_becomes_seiten() {
        let m = map(
            "<VORGANG><TITEL>T</TITEL><WICHTIGE_DRUCKSACHE>\
             <DRS_HERAUSGEBER>BT</DRS_HERAUSGEBER><DRS_NUMMER>17/00112</DRS_NUMMER>\
             <DRS_TYP>Gesetzentwurf</DRS_TYP>\
             <DRS_LINK>http://dipbt.bundestag.de:80/dip21/btd/17/001/1700112.pdf#page=5</DRS_LINK>\
             </WICHTIGE_DRUCKSACHE></VORGANG>",
        )
        .unwrap();
        assert_eq!(m.referenzen.len(), 1);
        let r = &m.referenzen[0];
        assert_eq!(r.nummer, "17/112");
        assert_eq!(r.seiten.as_deref(), Some("page=5"));
        assert_eq!(
            r.link.as_deref(),
            Some("http://dipbt.bundestag.de:80/dip21/btd/17/001/1700112.pdf")
        );
        assert_eq!(r.text.as_deref(), Some("Gesetzentwurf"));
    }

    #[test]
    fn plenum_seiten_come_from_element_not_fragment() {
        let m = map(
            "<VORGANG><TITEL>T</TITEL><PLENUM>\
             <PLPR_HERAUSGEBER>BT</PLPR_HERAUSGEBER><PLPR_NUMMER>17/042</PLPR_NUMMER>\
             <PLPR_KLARTEXT>2. Beratung</PLPR_KLARTEXT><PLPR_SEITEN>S. 4123-4130</PLPR_SEITEN>\
             <PLPR_LINK>http://dipbt.bundestag.de:80/dip21/btp/17/17042.pdf#P.4123</PLPR_LINK>\
             </PLENUM></VORGANG>",
        )
        .unwrap();
        let r = &m.referenzen[0];
        assert_eq!(r.typ, "plpr");
        assert_eq!(r.nummer, "17/42");
        assert_eq!(r.seiten.as_deref(), Some("S. 4123-4130"));
        assert_eq!(
            r.link.as_deref(),
            Some("http://dipbt.bundestag.de:80/dip21/btp/17/17042.pdf")
        );
    }

    #[test]
    fn schlagworte_are_collected() {
        let m = map(
            "<VORGANG><TITEL>T</TITEL><SCHLAGWORT>Beispiel</SCHLAGWORT><SCHLAGWORT>Gesetzgebung</SCHLAGWORT><SCHLAGWORT>  </SCHLAGWORT></VORGANG>",
        )
        .unwrap();
        assert_eq!(m.schlagworte, vec!["Beispiel", "Gesetzgebung"]);
    }
}
