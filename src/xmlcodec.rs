// Copyright (C) 2025 The Mordor Core Contributors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Entity XML codec (C13, §6): on-disk document format for Room/Monster/
//! Object/Player, built on `xml::reader::EventReader`/
//! `xml::writer::EventWriter` — the same crate the teacher uses for its MOO
//! document builtins (`kernel::vm::builtins::bf_documents`), repurposed
//! here for entity persistence. Root element name is the type name; child
//! elements map 1:1 to struct fields by name; unrecognized child elements
//! are consumed and discarded rather than rejected, so a newer server can
//! still load a document written by an older one (§6 forward-compat).

use std::io::{Read, Write};

use xml::reader::XmlEvent as ReadEvent;
use xml::writer::XmlEvent as WriteEvent;
use xml::{EmitterConfig, EventReader, EventWriter};

use crate::catref::CatRef;
use crate::entity::{Exit, Monster, Object, Player, Room, RoomAddress, WanderDescriptor};
use crate::error::ContentError;

/// Minimal pull-based helper over `xml::reader::EventReader`: collects the
/// text content of a single child element by name, skipping everything it
/// doesn't recognize. Good enough for the flat, non-recursive field sets
/// these entity documents use (exits are the one nested case and are
/// handled directly in `Room::from_xml`).
struct FieldReader<R: Read> {
    parser: EventReader<R>,
}

impl<R: Read> FieldReader<R> {
    fn new(source: R) -> Self {
        FieldReader { parser: EventReader::new(source) }
    }

    /// Reads one full document into a flat list of (element name, text)
    /// pairs at depth 1 (direct children of the root), plus any `<exit>`
    /// blocks collected as their own nested field lists.
    fn read_shallow_fields(
        &mut self,
        err_key: &CatRef,
    ) -> Result<(Vec<(String, String)>, Vec<Vec<(String, String)>>), ContentError> {
        let mut fields = Vec::new();
        let mut exits = Vec::new();
        let mut depth = 0i32;
        let mut current_name: Option<String> = None;
        let mut current_text = String::new();
        let mut exit_fields: Option<Vec<(String, String)>> = None;
        let mut exit_child_name: Option<String> = None;
        let mut exit_child_text = String::new();

        loop {
            let event = self
                .parser
                .next()
                .map_err(|e| ContentError::Malformed(err_key.clone(), e.to_string()))?;
            match event {
                ReadEvent::StartElement { name, .. } => {
                    depth += 1;
                    if depth == 2 {
                        current_name = Some(name.local_name.clone());
                        current_text.clear();
                        if name.local_name == "exit" {
                            exit_fields = Some(Vec::new());
                        }
                    } else if depth == 3 && exit_fields.is_some() {
                        exit_child_name = Some(name.local_name);
                        exit_child_text.clear();
                    }
                }
                ReadEvent::Characters(text) | ReadEvent::CData(text) => {
                    if depth == 3 && exit_fields.is_some() {
                        exit_child_text.push_str(&text);
                    } else if depth == 2 {
                        current_text.push_str(&text);
                    }
                }
                ReadEvent::EndElement { .. } => {
                    if depth == 3 && exit_fields.is_some() {
                        if let Some(name) = exit_child_name.take() {
                            exit_fields
                                .as_mut()
                                .expect("exit_fields is Some")
                                .push((name, std::mem::take(&mut exit_child_text)));
                        }
                    } else if depth == 2 {
                        if let Some(name) = current_name.take() {
                            if name == "exit" {
                                exits.push(exit_fields.take().unwrap_or_default());
                            } else {
                                fields.push((name, std::mem::take(&mut current_text)));
                            }
                        }
                    }
                    depth -= 1;
                    if depth < 0 {
                        break;
                    }
                }
                ReadEvent::EndDocument => break,
                _ => {}
            }
        }
        Ok((fields, exits))
    }
}

fn field<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
}

fn parse_bool(s: &str) -> bool {
    s == "1"
}

fn write_element<W: Write>(
    writer: &mut EventWriter<W>,
    name: &str,
    text: &str,
    key: &CatRef,
) -> Result<(), ContentError> {
    writer
        .write(WriteEvent::start_element(name))
        .map_err(|e| ContentError::Malformed(key.clone(), e.to_string()))?;
    writer
        .write(WriteEvent::characters(text))
        .map_err(|e| ContentError::Malformed(key.clone(), e.to_string()))?;
    writer
        .write(WriteEvent::end_element())
        .map_err(|e| ContentError::Malformed(key.clone(), e.to_string()))?;
    Ok(())
}

fn new_writer<W: Write>(sink: W) -> EventWriter<W> {
    EmitterConfig::new().perform_indent(true).create_writer(sink)
}

impl Room {
    pub fn to_xml<W: Write>(&self, sink: W) -> Result<(), ContentError> {
        let key = self.catref().cloned().unwrap_or_else(|| CatRef::new("area", 0));
        let mut writer = new_writer(sink);
        writer
            .write(WriteEvent::start_element("Room"))
            .map_err(|e| ContentError::Malformed(key.clone(), e.to_string()))?;
        write_element(&mut writer, "name", &self.name, &key)?;
        write_element(&mut writer, "description", &self.description, &key)?;
        write_element(&mut writer, "wander_allowed", if self.wander.allowed { "1" } else { "0" }, &key)?;
        write_element(&mut writer, "wander_traffic", &self.wander.traffic.to_string(), &key)?;

        for exit in &self.exits {
            writer
                .write(WriteEvent::start_element("exit"))
                .map_err(|e| ContentError::Malformed(key.clone(), e.to_string()))?;
            write_element(&mut writer, "name", &exit.name, &key)?;
            write_element(&mut writer, "keywords", &exit.keywords.join(","), &key)?;
            write_element(&mut writer, "destination", &destination_string(exit), &key)?;
            write_element(&mut writer, "closed", if exit.closed { "1" } else { "0" }, &key)?;
            writer
                .write(WriteEvent::end_element())
                .map_err(|e| ContentError::Malformed(key.clone(), e.to_string()))?;
        }

        writer
            .write(WriteEvent::end_element())
            .map_err(|e| ContentError::Malformed(key, e.to_string()))?;
        Ok(())
    }

    pub fn from_xml<R: Read>(source: R, key: &CatRef) -> Result<Room, ContentError> {
        let mut reader = FieldReader::new(source);
        let (fields, exits) = reader.read_shallow_fields(key)?;

        let mut room = Room::new_unique(key.clone());
        room.name = field(&fields, "name").unwrap_or_default().to_string();
        room.description = field(&fields, "description").unwrap_or_default().to_string();
        room.wander = WanderDescriptor {
            allowed: field(&fields, "wander_allowed").map(parse_bool).unwrap_or(false),
            traffic: field(&fields, "wander_traffic")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        };

        for exit_fields in &exits {
            let name = field(exit_fields, "name").unwrap_or_default().to_string();
            let keywords = field(exit_fields, "keywords")
                .map(|s| s.split(',').filter(|w| !w.is_empty()).map(str::to_string).collect())
                .unwrap_or_default();
            let destination = field(exit_fields, "destination")
                .and_then(parse_destination)
                .ok_or_else(|| ContentError::Malformed(key.clone(), format!("exit {name:?} has no destination")))?;
            let closed = field(exit_fields, "closed").map(parse_bool).unwrap_or(false);
            room.exits.push(Exit { name, keywords, destination, closed });
        }

        Ok(room)
    }
}

fn destination_string(exit: &Exit) -> String {
    match &exit.destination {
        RoomAddress::Unique(cr) => cr.to_string(),
        RoomAddress::Area { area, marker } => format!("{area}#{marker}"),
    }
}

fn parse_destination(s: &str) -> Option<RoomAddress> {
    if let Some((area, marker)) = s.split_once('#') {
        return Some(RoomAddress::Area { area: area.to_string(), marker: marker.parse().ok()? });
    }
    CatRef::parse(s).map(RoomAddress::Unique)
}

impl Monster {
    pub fn to_xml<W: Write>(&self, sink: W, key: &CatRef) -> Result<(), ContentError> {
        let mut writer = new_writer(sink);
        writer
            .write(WriteEvent::start_element("Monster"))
            .map_err(|e| ContentError::Malformed(key.clone(), e.to_string()))?;
        write_element(&mut writer, "name", &self.name, key)?;
        write_element(&mut writer, "keywords", &self.keywords.join(","), key)?;
        writer
            .write(WriteEvent::end_element())
            .map_err(|e| ContentError::Malformed(key.clone(), e.to_string()))?;
        Ok(())
    }

    pub fn from_xml<R: Read>(source: R, key: &CatRef) -> Result<Monster, ContentError> {
        let mut reader = FieldReader::new(source);
        let (fields, _exits) = reader.read_shallow_fields(key)?;
        let mut m = Monster::new(field(&fields, "name").unwrap_or_default());
        m.keywords = field(&fields, "keywords")
            .map(|s| s.split(',').filter(|w| !w.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        Ok(m)
    }
}

impl Object {
    pub fn to_xml<W: Write>(&self, sink: W, key: &CatRef) -> Result<(), ContentError> {
        let mut writer = new_writer(sink);
        writer
            .write(WriteEvent::start_element("Object"))
            .map_err(|e| ContentError::Malformed(key.clone(), e.to_string()))?;
        write_element(&mut writer, "name", &self.name, key)?;
        write_element(&mut writer, "keywords", &self.keywords.join(","), key)?;
        writer
            .write(WriteEvent::end_element())
            .map_err(|e| ContentError::Malformed(key.clone(), e.to_string()))?;
        Ok(())
    }

    pub fn from_xml<R: Read>(source: R, key: &CatRef) -> Result<Object, ContentError> {
        let mut reader = FieldReader::new(source);
        let (fields, _exits) = reader.read_shallow_fields(key)?;
        let mut o = Object::new(field(&fields, "name").unwrap_or_default());
        o.keywords = field(&fields, "keywords")
            .map(|s| s.split(',').filter(|w| !w.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        Ok(o)
    }
}

impl Player {
    pub fn to_xml<W: Write>(&self, sink: W, key: &CatRef) -> Result<(), ContentError> {
        let mut writer = new_writer(sink);
        writer
            .write(WriteEvent::start_element("Player"))
            .map_err(|e| ContentError::Malformed(key.clone(), e.to_string()))?;
        write_element(&mut writer, "name", &self.name, key)?;
        write_element(&mut writer, "level", &self.level.to_string(), key)?;
        write_element(&mut writer, "is_staff", if self.is_staff { "1" } else { "0" }, key)?;
        write_element(&mut writer, "is_builder", if self.is_builder { "1" } else { "0" }, key)?;
        write_element(
            &mut writer,
            "bound_room",
            &self.bound_room.as_ref().map(|r| r.to_string()).unwrap_or_default(),
            key,
        )?;
        writer
            .write(WriteEvent::end_element())
            .map_err(|e| ContentError::Malformed(key.clone(), e.to_string()))?;
        Ok(())
    }

    pub fn from_xml<R: Read>(source: R, key: &CatRef) -> Result<Player, ContentError> {
        let mut reader = FieldReader::new(source);
        let (fields, _exits) = reader.read_shallow_fields(key)?;
        let mut p = Player::new(field(&fields, "name").unwrap_or_default());
        p.level = field(&fields, "level").and_then(|s| s.parse().ok()).unwrap_or(1);
        p.is_staff = field(&fields, "is_staff").map(parse_bool).unwrap_or(false);
        p.is_builder = field(&fields, "is_builder").map(parse_bool).unwrap_or(false);
        p.bound_room = field(&fields, "bound_room").and_then(CatRef::parse);
        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_round_trips_scalar_fields() {
        let mut room = Room::new_unique(CatRef::new("midgaard", 1));
        room.name = "The Town Square".to_string();
        room.description = "A bustling square.".to_string();
        room.wander.allowed = true;
        room.wander.traffic = 3;

        let mut buf = Vec::new();
        room.to_xml(&mut buf).unwrap();

        let loaded = Room::from_xml(buf.as_slice(), &CatRef::new("midgaard", 1)).unwrap();
        assert_eq!(loaded.name, "The Town Square");
        assert_eq!(loaded.description, "A bustling square.");
        assert!(loaded.wander.allowed);
        assert_eq!(loaded.wander.traffic, 3);
    }

    #[test]
    fn room_round_trips_exits() {
        let mut room = Room::new_unique(CatRef::new("midgaard", 1));
        room.exits.push(Exit {
            name: "north".to_string(),
            keywords: vec!["gate".to_string(), "iron".to_string()],
            destination: RoomAddress::Unique(CatRef::new("midgaard", 2)),
            closed: true,
        });
        room.exits.push(Exit {
            name: "down".to_string(),
            keywords: vec![],
            destination: RoomAddress::Area { area: "sewers".to_string(), marker: 7 },
            closed: false,
        });

        let mut buf = Vec::new();
        room.to_xml(&mut buf).unwrap();

        let loaded = Room::from_xml(buf.as_slice(), &CatRef::new("midgaard", 1)).unwrap();
        assert_eq!(loaded.exits.len(), 2);
        assert_eq!(loaded.exits[0].name, "north");
        assert_eq!(loaded.exits[0].keywords, vec!["gate".to_string(), "iron".to_string()]);
        assert_eq!(loaded.exits[0].destination, RoomAddress::Unique(CatRef::new("midgaard", 2)));
        assert!(loaded.exits[0].closed);
        assert_eq!(loaded.exits[1].name, "down");
        assert_eq!(loaded.exits[1].destination, RoomAddress::Area { area: "sewers".to_string(), marker: 7 });
        assert!(!loaded.exits[1].closed);
    }

    #[test]
    fn monster_round_trips_keywords() {
        let mut m = Monster::new("a grizzled orc");
        m.keywords = vec!["orc".to_string(), "grizzled".to_string()];
        let key = CatRef::new("midgaard", 5);

        let mut buf = Vec::new();
        m.to_xml(&mut buf, &key).unwrap();

        let loaded = Monster::from_xml(buf.as_slice(), &key).unwrap();
        assert_eq!(loaded.name, "a grizzled orc");
        assert_eq!(loaded.keywords, vec!["orc".to_string(), "grizzled".to_string()]);
    }

    #[test]
    fn player_round_trips_staff_and_bound_room() {
        let mut p = Player::new("bob");
        p.is_staff = true;
        p.level = 40;
        p.bound_room = Some(CatRef::new("midgaard", 1));
        let key = CatRef::new("player", 0);

        let mut buf = Vec::new();
        p.to_xml(&mut buf, &key).unwrap();

        let loaded = Player::from_xml(buf.as_slice(), &key).unwrap();
        assert_eq!(loaded.name, "bob");
        assert!(loaded.is_staff);
        assert_eq!(loaded.level, 40);
        assert_eq!(loaded.bound_room, Some(CatRef::new("midgaard", 1)));
    }

    #[test]
    fn malformed_document_reports_content_error() {
        let key = CatRef::new("midgaard", 1);
        let err = Room::from_xml(&b"<Room><name>unterminated"[..], &key).unwrap_err();
        assert!(matches!(err, ContentError::Malformed(_, _)));
    }
}
