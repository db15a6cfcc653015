//! Todo model and its mapper

use repository::EntityMapper;
use shared::{Predicate, Record};

pub const ENTITY: &str = "TodoEntity";

#[derive(Debug, Clone, PartialEq)]
pub struct Todo {
    pub uuid: String,
    pub title: String,
    pub description: String,
    pub is_completed: bool,
}

impl Todo {
    /// Deterministic mock data: `count` items, every third one completed
    pub fn mock(count: usize) -> Vec<Todo> {
        (0..count)
            .map(|index| Todo {
                uuid: index.to_string(),
                title: format!("Title: {}", index),
                description: format!("Description: {}", index),
                is_completed: index % 3 == 0,
            })
            .collect()
    }
}

pub struct TodoEntityMapper;

impl EntityMapper for TodoEntityMapper {
    type Model = Todo;

    fn entity_name(&self) -> &str {
        ENTITY
    }

    fn convert(&self, record: &Record) -> Option<Todo> {
        Some(Todo {
            uuid: record.get_str("id")?.to_string(),
            title: record.get_str("title")?.to_string(),
            description: record.get_str("descriptions")?.to_string(),
            is_completed: record.get_bool("isCompleted").unwrap_or(false),
        })
    }

    fn update(&self, record: &mut Record, model: &Todo) {
        record.set("id", model.uuid.as_str());
        record.set("title", model.title.as_str());
        record.set("descriptions", model.description.as_str());
        record.set("isCompleted", model.is_completed);
    }

    fn record_key(&self, record: &Record) -> String {
        record.get_str("id").unwrap_or_default().to_string()
    }

    fn model_key(&self, model: &Todo) -> String {
        model.uuid.clone()
    }

    fn key_predicate(&self, keys: &[String]) -> Option<Predicate> {
        Some(Predicate::is_in("id", keys.iter().map(String::as_str)))
    }
}
