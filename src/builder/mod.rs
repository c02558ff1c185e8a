//! Document builder: denormalizes store records into search documents.
//!
//! Each search resource has a builder that pulls the entity's row plus its
//! relations (owner, tags, translation links) out of SQLite, normalizes the
//! free text, and emits a flat `SearchDocument` ready for indexing.

use std::collections::BTreeSet;

use crate::document::{parse_datetime, FieldValue, SearchDocument};
use crate::error::Result;
use crate::resource::EntityKind;
use crate::search::index::SearchIndex;
use crate::stem::Stemmer;
use crate::storage::{
    CommentRecord, Database, ListRecord, SentenceRecord, TagRecord, UserRecord, WallPostRecord,
};
use crate::text;

/// Correctness value marking a sentence as not yet approved.
pub const UNAPPROVED_CORRECTNESS: i64 = -1;

/// `hasaudio` values that count as having a recording.
pub const AUDIO_SOURCES: [&str; 2] = ["shtooka", "from_users"];

pub struct DocumentBuilder<'a> {
    db: &'a Database,
    stemmer: &'a Stemmer,
}

impl<'a> DocumentBuilder<'a> {
    pub fn new(db: &'a Database, stemmer: &'a Stemmer) -> Self {
        Self { db, stemmer }
    }

    /// Rebuild an index from the store. `since` narrows the scan to records
    /// touched at or after that timestamp; records that fail to build are
    /// skipped with a warning rather than aborting the run.
    pub fn rebuild(&self, index: &SearchIndex, since: Option<&str>) -> Result<usize> {
        let entity = index.resource().entity().ok_or_else(|| {
            crate::error::ApiError::UnknownResource(format!(
                "'{}' is not an indexed resource.",
                index.resource().name
            ))
        })?;

        let mut indexed = 0usize;
        match entity {
            EntityKind::Sentence => {
                for record in self.db.sentences(since)? {
                    match self.build_sentence(&record) {
                        Ok(doc) => {
                            index.add_document(&doc)?;
                            indexed += 1;
                        }
                        Err(err) => {
                            tracing::warn!(id = record.id, %err, "skipping sentence");
                        }
                    }
                }
            }
            EntityKind::Tag => {
                for record in self.db.tags(since)? {
                    match self.build_tag(&record) {
                        Ok(doc) => {
                            index.add_document(&doc)?;
                            indexed += 1;
                        }
                        Err(err) => {
                            tracing::warn!(id = record.id, %err, "skipping tag");
                        }
                    }
                }
            }
            EntityKind::List => {
                for record in self.db.lists(since)? {
                    match self.build_list(&record) {
                        Ok(doc) => {
                            index.add_document(&doc)?;
                            indexed += 1;
                        }
                        Err(err) => {
                            tracing::warn!(id = record.id, %err, "skipping list");
                        }
                    }
                }
            }
            EntityKind::Comment => {
                for record in self.db.comments(since)? {
                    match self.build_comment(&record) {
                        Ok(doc) => {
                            index.add_document(&doc)?;
                            indexed += 1;
                        }
                        Err(err) => {
                            tracing::warn!(id = record.id, %err, "skipping comment");
                        }
                    }
                }
            }
            EntityKind::Wall => {
                for record in self.db.wall_posts(since)? {
                    match self.build_wall_post(&record) {
                        Ok(doc) => {
                            index.add_document(&doc)?;
                            indexed += 1;
                        }
                        Err(err) => {
                            tracing::warn!(id = record.id, %err, "skipping wall post");
                        }
                    }
                }
            }
            EntityKind::User => {
                for record in self.db.users(since)? {
                    match self.build_user(&record) {
                        Ok(doc) => {
                            index.add_document(&doc)?;
                            indexed += 1;
                        }
                        Err(err) => {
                            tracing::warn!(id = record.id, %err, "skipping user");
                        }
                    }
                }
            }
        }

        index.commit()?;
        tracing::info!(
            resource = %index.resource().name,
            indexed,
            "index rebuild committed"
        );
        Ok(indexed)
    }

    pub fn build_sentence(&self, record: &SentenceRecord) -> Result<SearchDocument> {
        let mut doc = SearchDocument::new(EntityKind::Sentence, doc_id(record.id));
        let body = text::normalize(&record.text);
        let lang = record.lang.as_deref().unwrap_or("");

        doc.set("text", FieldValue::Text(body.clone()));
        doc.set("sentence_text", FieldValue::Text(body.clone()));
        doc.set(
            "sentence_text_stemmed",
            FieldValue::Text(self.stemmer.stem(&body, lang)),
        );
        doc.set("lang", FieldValue::Text(lang.to_string()));
        doc.set("lang_id", FieldValue::Integer(record.lang_id));

        if let Some(user_id) = record.user_id {
            doc.set("user_id", FieldValue::Integer(user_id));
            if let Some(username) = self.db.username(user_id)? {
                doc.set("owner", FieldValue::Text(username));
            }
        }

        set_date(&mut doc, "created", record.created.as_deref());
        set_date(&mut doc, "modified", record.modified.as_deref());

        let tags = self.db.tag_names_for_sentence(record.id)?;
        doc.set("tags", FieldValue::Text(tags.join(" ")));

        let mut trans_langs = BTreeSet::new();
        let mut trans_owners = BTreeSet::new();
        let mut trans_orphan = false;
        let mut trans_audio = false;
        let mut trans_unapproved = false;
        for translation in self.db.translations_of(record.id)? {
            if let Some(lang) = translation.lang {
                trans_langs.insert(lang);
            }
            match translation.user_id {
                Some(user_id) => {
                    if let Some(username) = self.db.username(user_id)? {
                        trans_owners.insert(username);
                    }
                }
                None => trans_orphan = true,
            }
            trans_audio |= has_audio(&translation.hasaudio);
            trans_unapproved |= translation.correctness == UNAPPROVED_CORRECTNESS;
        }
        doc.set(
            "trans_langs",
            FieldValue::Text(join_set(&trans_langs)),
        );
        doc.set(
            "trans_owners",
            FieldValue::Text(join_set(&trans_owners)),
        );
        doc.set("trans_orphan", FieldValue::Bool(trans_orphan));
        doc.set("trans_audio", FieldValue::Bool(trans_audio));
        doc.set("trans_unapproved", FieldValue::Bool(trans_unapproved));

        doc.set("has_audio", FieldValue::Bool(has_audio(&record.hasaudio)));
        doc.set(
            "unapproved",
            FieldValue::Bool(record.correctness == UNAPPROVED_CORRECTNESS),
        );
        doc.set("correctness", FieldValue::Integer(record.correctness));

        Ok(doc)
    }

    pub fn build_tag(&self, record: &TagRecord) -> Result<SearchDocument> {
        let mut doc = SearchDocument::new(EntityKind::Tag, doc_id(record.id));
        let name = text::normalize(&record.name);

        doc.set("text", FieldValue::Text(name.clone()));
        doc.set("name", FieldValue::Text(name));
        if let Some(user_id) = record.user_id {
            if let Some(username) = self.db.username(user_id)? {
                doc.set("user", FieldValue::Text(username));
            }
        }
        set_date(&mut doc, "created", record.created.as_deref());
        Ok(doc)
    }

    pub fn build_list(&self, record: &ListRecord) -> Result<SearchDocument> {
        let mut doc = SearchDocument::new(EntityKind::List, doc_id(record.id));
        let name = text::normalize(&record.name);

        doc.set("text", FieldValue::Text(name.clone()));
        doc.set("name", FieldValue::Text(name));
        if let Some(user_id) = record.user_id {
            if let Some(username) = self.db.username(user_id)? {
                doc.set("user", FieldValue::Text(username));
            }
        }
        set_date(&mut doc, "created", record.created.as_deref());
        set_date(&mut doc, "modified", record.modified.as_deref());
        Ok(doc)
    }

    pub fn build_comment(&self, record: &CommentRecord) -> Result<SearchDocument> {
        let mut doc = SearchDocument::new(EntityKind::Comment, doc_id(record.id));
        let body = text::normalize(&record.text);

        doc.set("text", FieldValue::Text(body.clone()));
        doc.set("comment_text", FieldValue::Text(body));
        doc.set("sentence_id", FieldValue::Integer(record.sentence_id));
        if let Some(user_id) = record.user_id {
            if let Some(username) = self.db.username(user_id)? {
                doc.set("user", FieldValue::Text(username));
            }
        }
        set_date(&mut doc, "created", record.created.as_deref());
        set_date(&mut doc, "modified", record.modified.as_deref());
        doc.set("hidden", FieldValue::Bool(record.hidden));
        Ok(doc)
    }

    pub fn build_wall_post(&self, record: &WallPostRecord) -> Result<SearchDocument> {
        let mut doc = SearchDocument::new(EntityKind::Wall, doc_id(record.id));
        let body = text::normalize(&record.content);

        doc.set("text", FieldValue::Text(body.clone()));
        doc.set("content", FieldValue::Text(body));
        if let Some(owner_id) = record.owner_id {
            if let Some(username) = self.db.username(owner_id)? {
                doc.set("owner", FieldValue::Text(username));
            }
        }
        set_date(&mut doc, "date", record.date.as_deref());
        set_date(&mut doc, "modified", record.modified.as_deref());
        Ok(doc)
    }

    pub fn build_user(&self, record: &UserRecord) -> Result<SearchDocument> {
        let mut doc = SearchDocument::new(EntityKind::User, doc_id(record.id));

        doc.set("text", FieldValue::Text(record.username.clone()));
        doc.set("username", FieldValue::Text(record.username.clone()));
        set_date(&mut doc, "since", Some(&record.since));
        if let Some(group_id) = record.group_id {
            if let Some(group) = self.db.group_name(group_id)? {
                doc.set("group", FieldValue::Text(group));
            }
        }
        Ok(doc)
    }
}

fn doc_id(id: i64) -> u64 {
    u64::try_from(id).unwrap_or_default()
}

fn has_audio(hasaudio: &str) -> bool {
    AUDIO_SOURCES.contains(&hasaudio)
}

fn join_set(values: &BTreeSet<String>) -> String {
    values
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a stored timestamp into a date field. Malformed timestamps are
/// logged and dropped instead of failing the whole document.
fn set_date(doc: &mut SearchDocument, name: &'static str, raw: Option<&str>) {
    let Some(raw) = raw else { return };
    match parse_datetime(raw) {
        Ok(dt) => doc.set(name, FieldValue::Date(dt)),
        Err(err) => {
            tracing::warn!(id = doc.id, field = name, %err, "unparseable timestamp");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::resource;

    fn fixture() -> (Database, Stemmer) {
        let db = Database::open_in_memory().unwrap();
        let stemmer = Stemmer::new(&Config::default().stemming);

        db.insert_group(1, "admin").unwrap();
        db.insert_user(&UserRecord {
            id: 1,
            username: "alice".to_string(),
            since: "2010-05-01 09:00:00".to_string(),
            group_id: Some(1),
        })
        .unwrap();
        db.insert_user(&UserRecord {
            id: 2,
            username: "bob".to_string(),
            since: "2012-08-15 10:30:00".to_string(),
            group_id: None,
        })
        .unwrap();

        db.insert_sentence(&SentenceRecord {
            id: 1,
            text: "The cats are running".to_string(),
            lang: Some("eng".to_string()),
            lang_id: 1,
            user_id: Some(1),
            created: Some("2015-03-10 12:00:00".to_string()),
            modified: Some("2015-03-11 12:00:00".to_string()),
            hasaudio: "shtooka".to_string(),
            correctness: 0,
        })
        .unwrap();
        db.insert_sentence(&SentenceRecord {
            id: 2,
            text: "Die Katzen laufen".to_string(),
            lang: Some("deu".to_string()),
            lang_id: 2,
            user_id: None,
            created: Some("2015-04-01 08:00:00".to_string()),
            modified: None,
            hasaudio: "no".to_string(),
            correctness: UNAPPROVED_CORRECTNESS,
        })
        .unwrap();
        db.link_translation(1, 2).unwrap();

        db.insert_tag(&TagRecord {
            id: 1,
            name: "animals".to_string(),
            internal_name: Some("animals".to_string()),
            user_id: Some(1),
            created: Some("2015-01-01 00:00:00".to_string()),
        })
        .unwrap();
        db.tag_sentence(1, 1, Some(1)).unwrap();

        (db, stemmer)
    }

    #[test]
    fn test_build_sentence_denormalizes_relations() {
        let (db, stemmer) = fixture();
        let builder = DocumentBuilder::new(&db, &stemmer);
        let record = db.sentence(1).unwrap().unwrap();
        let doc = builder.build_sentence(&record).unwrap();

        assert_eq!(doc.id, 1);
        assert_eq!(doc.get("owner"), Some(&FieldValue::Text("alice".into())));
        assert_eq!(doc.get("tags"), Some(&FieldValue::Text("animals".into())));
        assert_eq!(
            doc.get("trans_langs"),
            Some(&FieldValue::Text("deu".into()))
        );
        assert_eq!(doc.get("trans_owners"), Some(&FieldValue::Text("".into())));
        assert_eq!(doc.get("trans_orphan"), Some(&FieldValue::Bool(true)));
        assert_eq!(doc.get("trans_audio"), Some(&FieldValue::Bool(false)));
        assert_eq!(doc.get("trans_unapproved"), Some(&FieldValue::Bool(true)));
        assert_eq!(doc.get("has_audio"), Some(&FieldValue::Bool(true)));
        assert_eq!(doc.get("unapproved"), Some(&FieldValue::Bool(false)));
    }

    #[test]
    fn test_build_sentence_stems_with_its_own_language() {
        let (db, stemmer) = fixture();
        let builder = DocumentBuilder::new(&db, &stemmer);
        let record = db.sentence(1).unwrap().unwrap();
        let doc = builder.build_sentence(&record).unwrap();

        assert_eq!(
            doc.get("sentence_text_stemmed"),
            Some(&FieldValue::Text("cat run".into()))
        );
    }

    #[test]
    fn test_build_unapproved_sentence() {
        let (db, stemmer) = fixture();
        let builder = DocumentBuilder::new(&db, &stemmer);
        let record = db.sentence(2).unwrap().unwrap();
        let doc = builder.build_sentence(&record).unwrap();

        assert_eq!(doc.get("unapproved"), Some(&FieldValue::Bool(true)));
        assert_eq!(doc.get("owner"), None);
        assert_eq!(doc.get("trans_audio"), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn test_build_user_resolves_group() {
        let (db, stemmer) = fixture();
        let builder = DocumentBuilder::new(&db, &stemmer);
        let users = db.users(None).unwrap();
        let doc = builder.build_user(&users[0]).unwrap();

        assert_eq!(doc.get("username"), Some(&FieldValue::Text("alice".into())));
        assert_eq!(doc.get("group"), Some(&FieldValue::Text("admin".into())));
        assert!(matches!(doc.get("since"), Some(FieldValue::Date(_))));

        let doc = builder.build_user(&users[1]).unwrap();
        assert_eq!(doc.get("group"), None);
    }

    #[test]
    fn test_rebuild_sentences_end_to_end() {
        let (db, stemmer) = fixture();
        let builder = DocumentBuilder::new(&db, &stemmer);
        let index =
            SearchIndex::open_in_memory(resource::find("sentences_search").unwrap()).unwrap();

        let indexed = builder.rebuild(&index, None).unwrap();
        assert_eq!(indexed, 2);
        assert_eq!(index.num_docs(), 2);
    }

    #[test]
    fn test_rebuild_with_since_skips_untouched() {
        let (db, stemmer) = fixture();
        let builder = DocumentBuilder::new(&db, &stemmer);
        let index =
            SearchIndex::open_in_memory(resource::find("sentences_search").unwrap()).unwrap();

        let indexed = builder
            .rebuild(&index, Some("2015-03-15 00:00:00"))
            .unwrap();
        assert_eq!(indexed, 1);
    }
}
