//! EmulationStation `gamelist.xml` reading and writing.
//!
//! Reading goes through a `quick-xml` pull parser; writing emits the XML by
//! hand so the output stays byte-stable and diff-friendly across runs.

use std::fs;
use std::io::Write;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::GamelistError;

/// One `<game>` element. `favorite`, `lastplayed` and `playcount` are user
/// state owned by the frontend; refresh runs must carry them over.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameEntry {
    pub path: String,
    pub name: String,
    pub desc: String,
    pub image: String,
    pub thumbnail: String,
    pub marquee: String,
    pub video: String,
    pub rating: Option<f32>,
    pub release_date: String,
    pub developer: String,
    pub publisher: String,
    pub genre: String,
    pub players: Option<u32>,
    pub favorite: bool,
    pub last_played: String,
    pub play_count: Option<u32>,
    /// Which metadata source produced this entry
    pub source: String,
}

impl GameEntry {
    fn set_field(&mut self, tag: &str, value: &str) {
        match tag {
            "path" => self.path = value.to_string(),
            "name" => self.name = value.to_string(),
            "desc" => self.desc = value.to_string(),
            "image" => self.image = value.to_string(),
            "thumbnail" => self.thumbnail = value.to_string(),
            "marquee" => self.marquee = value.to_string(),
            "video" => self.video = value.to_string(),
            "rating" => self.rating = value.parse().ok(),
            "releasedate" => self.release_date = value.to_string(),
            "developer" => self.developer = value.to_string(),
            "publisher" => self.publisher = value.to_string(),
            "genre" => self.genre = value.to_string(),
            "players" => self.players = value.parse().ok(),
            "favorite" => self.favorite = value.eq_ignore_ascii_case("true"),
            "lastplayed" => self.last_played = value.to_string(),
            "playcount" => self.play_count = value.parse().ok(),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameList {
    pub entries: Vec<GameEntry>,
}

impl GameList {
    /// Load a gamelist. A missing file is an empty list, not an error.
    pub fn load(path: &Path) -> Result<Self, GamelistError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(xml: &str) -> Result<Self, GamelistError> {
        let parse_err = |e: &dyn std::fmt::Display| GamelistError::Parse(e.to_string());

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut entries = Vec::new();
        let mut current: Option<GameEntry> = None;
        let mut field: Option<String> = None;
        loop {
            match reader.read_event().map_err(|e| parse_err(&e))? {
                Event::Start(e) => {
                    if e.name().as_ref() == b"game" {
                        let mut entry = GameEntry::default();
                        for attr in e.attributes() {
                            let attr = attr.map_err(|e| parse_err(&e))?;
                            if attr.key.as_ref() == b"source" {
                                entry.source = attr
                                    .unescape_value()
                                    .map_err(|e| parse_err(&e))?
                                    .into_owned();
                            }
                        }
                        current = Some(entry);
                    } else if current.is_some() {
                        field = Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                    }
                }
                Event::Text(t) => {
                    if let (Some(entry), Some(tag)) = (current.as_mut(), field.as_deref()) {
                        let text = t.unescape().map_err(|e| parse_err(&e))?;
                        entry.set_field(tag, &text);
                    }
                }
                Event::End(e) => {
                    if e.name().as_ref() == b"game" {
                        if let Some(entry) = current.take() {
                            entries.push(entry);
                        }
                    } else {
                        field = None;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(Self { entries })
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    /// Insert or replace the entry for `entry.path`. When replacing, the
    /// frontend-owned user fields of the old entry survive.
    pub fn upsert(&mut self, mut entry: GameEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.path == entry.path) {
            entry.favorite = existing.favorite;
            entry.last_played = existing.last_played.clone();
            entry.play_count = existing.play_count;
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    /// Drop entries whose ROM file no longer exists under `rom_dir`.
    pub fn filter_to_existing(&mut self, rom_dir: &Path) {
        self.entries.retain(|e| {
            let rel = e.path.strip_prefix("./").unwrap_or(&e.path);
            rom_dir.join(rel).exists()
        });
    }

    /// Write the list out, overwriting `path`.
    pub fn write(&self, path: &Path) -> Result<(), GamelistError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\"?>\n");
        xml.push_str("<gameList>\n");
        for entry in &self.entries {
            if entry.source.is_empty() {
                xml.push_str("  <game>\n");
            } else {
                xml.push_str("  <game source=\"");
                xml.push_str(&escape_xml(&entry.source));
                xml.push_str("\">\n");
            }
            write_tag(&mut xml, "path", &entry.path);
            write_tag(&mut xml, "name", &entry.name);
            if !entry.desc.is_empty() {
                write_tag(&mut xml, "desc", &entry.desc);
            }
            if !entry.image.is_empty() {
                write_tag(&mut xml, "image", &entry.image);
            }
            if !entry.thumbnail.is_empty() {
                write_tag(&mut xml, "thumbnail", &entry.thumbnail);
            }
            if !entry.marquee.is_empty() {
                write_tag(&mut xml, "marquee", &entry.marquee);
            }
            if !entry.video.is_empty() {
                write_tag(&mut xml, "video", &entry.video);
            }
            if let Some(rating) = entry.rating {
                write_tag(&mut xml, "rating", &format!("{rating:.2}"));
            }
            if !entry.release_date.is_empty() {
                write_tag(&mut xml, "releasedate", &format_es_date(&entry.release_date));
            }
            if !entry.developer.is_empty() {
                write_tag(&mut xml, "developer", &entry.developer);
            }
            if !entry.publisher.is_empty() {
                write_tag(&mut xml, "publisher", &entry.publisher);
            }
            if !entry.genre.is_empty() {
                write_tag(&mut xml, "genre", &entry.genre);
            }
            if let Some(players) = entry.players {
                write_tag(&mut xml, "players", &players.to_string());
            }
            if entry.favorite {
                write_tag(&mut xml, "favorite", "true");
            }
            if !entry.last_played.is_empty() {
                write_tag(&mut xml, "lastplayed", &entry.last_played);
            }
            if let Some(count) = entry.play_count {
                write_tag(&mut xml, "playcount", &count.to_string());
            }
            xml.push_str("  </game>\n");
        }
        xml.push_str("</gameList>\n");

        let mut file = fs::File::create(path)?;
        file.write_all(xml.as_bytes())?;
        Ok(())
    }
}

fn write_tag(xml: &mut String, tag: &str, value: &str) {
    xml.push_str("    <");
    xml.push_str(tag);
    xml.push('>');
    xml.push_str(&escape_xml(value));
    xml.push_str("</");
    xml.push_str(tag);
    xml.push_str(">\n");
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Normalize YYYY-MM-DD or YYYYMMDD into EmulationStation's
/// YYYYMMDDT000000. Idempotent, so loaded entries round-trip unchanged.
fn format_es_date(date: &str) -> String {
    let cleaned = date.replace('-', "");
    if cleaned.len() >= 8 {
        format!("{}T000000", &cleaned[..8])
    } else {
        format!("{cleaned}T000000")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> GameEntry {
        GameEntry {
            path: "./mario.nes".to_string(),
            name: "Super Mario Bros. <3 & more".to_string(),
            desc: "Jump around.".to_string(),
            rating: Some(0.85),
            release_date: "1985-09-13".to_string(),
            players: Some(2),
            source: "hashdb".to_string(),
            ..GameEntry::default()
        }
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gamelist.xml");

        let mut list = GameList::default();
        list.entries.push(sample_entry());
        list.write(&path).unwrap();

        let loaded = GameList::load(&path).unwrap();
        assert_eq!(loaded.entries.len(), 1);
        let e = &loaded.entries[0];
        assert_eq!(e.path, "./mario.nes");
        assert_eq!(e.name, "Super Mario Bros. <3 & more");
        assert_eq!(e.release_date, "19850913T000000");
        assert_eq!(e.players, Some(2));
        assert_eq!(e.source, "hashdb");
        assert!(!e.favorite);
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let list = GameList::load(&dir.path().join("nope.xml")).unwrap();
        assert!(list.entries.is_empty());
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = GameList::parse("<gameList><game></wrong></gameList>").unwrap_err();
        assert!(matches!(err, GamelistError::Parse(_)));
    }

    #[test]
    fn upsert_preserves_user_fields() {
        let mut list = GameList::default();
        let mut old = sample_entry();
        old.favorite = true;
        old.play_count = Some(17);
        old.last_played = "20250101T120000".to_string();
        list.entries.push(old);

        let mut replacement = sample_entry();
        replacement.name = "Super Mario Bros.".to_string();
        replacement.favorite = false;
        list.upsert(replacement);

        assert_eq!(list.entries.len(), 1);
        let e = &list.entries[0];
        assert_eq!(e.name, "Super Mario Bros.");
        assert!(e.favorite);
        assert_eq!(e.play_count, Some(17));
        assert_eq!(e.last_played, "20250101T120000");
    }

    #[test]
    fn filter_drops_entries_without_rom_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kept.nes"), b"x").unwrap();

        let mut list = GameList::default();
        let mut kept = sample_entry();
        kept.path = "./kept.nes".to_string();
        let mut gone = sample_entry();
        gone.path = "./gone.nes".to_string();
        list.entries.push(kept);
        list.entries.push(gone);

        list.filter_to_existing(dir.path());
        assert_eq!(list.entries.len(), 1);
        assert_eq!(list.entries[0].path, "./kept.nes");
    }

    #[test]
    fn es_date_formatting_is_idempotent() {
        assert_eq!(format_es_date("1985-09-13"), "19850913T000000");
        assert_eq!(format_es_date("19850913T000000"), "19850913T000000");
    }
}
