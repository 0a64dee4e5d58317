//! Hand-written models shared by the integration tests.
//!
//! `Person` has many `Pet`s (foreign key managed by the store) and one
//! `Profile` (foreign key mapped as a field). A `Ticket` points forward at
//! its owning `Person`.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use recordstore::prelude::*;
use recordstore_memory::MemoryConnection;

// ============================================================================
// Hooks
// ============================================================================

/// Which hooks a test record declares, which one fails, and where calls go.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    pub declared: HookSet,
    pub fail_on: Option<Hook>,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl Lifecycle {
    pub fn new(declared: &[Hook]) -> Self {
        Self {
            declared: HookSet::of(declared),
            ..Self::default()
        }
    }

    pub fn failing(mut self, hook: Hook) -> Self {
        self.declared = self.declared.with(hook);
        self.fail_on = Some(hook);
        self
    }

    pub fn sharing(mut self, log: &Arc<Mutex<Vec<String>>>) -> Self {
        self.log = Arc::clone(log);
        self
    }

    fn run(&self, model: &str, hook: Hook) -> std::result::Result<(), HookFailure> {
        self.log.lock().unwrap().push(format!("{model}.{hook}"));
        if self.fail_on == Some(hook) {
            return Err(format!("{model} rejected {hook}").into());
        }
        Ok(())
    }
}

pub fn calls(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().unwrap().clone()
}

// ============================================================================
// Person
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Address {
    pub street: String,
    pub city: String,
}

#[derive(Debug, Clone, Default)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub age: Option<i32>,
    pub tags: Vec<String>,
    pub attrs: serde_json::Value,
    pub address: Address,
    pub pets: RelatedMany<Pet>,
    pub profile: Related<Profile>,
    pub state: RecordState,
    pub lifecycle: Lifecycle,
}

impl Person {
    pub fn new(name: &str, age: i32) -> Self {
        Self {
            name: name.to_string(),
            age: Some(age),
            ..Self::default()
        }
    }
}

impl Record for Person {
    fn model_name(&self) -> &'static str {
        "Person"
    }

    fn primary_key(&self) -> Value {
        Value::from(self.id)
    }

    fn set_primary_key(&mut self, value: Value) -> Result<()> {
        value.assign(&mut self.id, "id")
    }

    fn get(&self, column: &str) -> Result<Value> {
        Ok(match column {
            "id" => Value::from(self.id),
            "name" => Value::from(self.name.as_str()),
            "age" => Value::from(self.age),
            "tags" => Value::from(self.tags.clone()),
            "attrs" => Value::from(self.attrs.clone()),
            "address_street" => Value::from(self.address.street.as_str()),
            "address_city" => Value::from(self.address.city.as_str()),
            _ => return Err(unknown_column("Person", column)),
        })
    }

    fn set(&mut self, column: &str, value: Value) -> Result<()> {
        match column {
            "id" => value.assign(&mut self.id, column),
            "name" => value.assign(&mut self.name, column),
            "age" => value.assign(&mut self.age, column),
            "tags" => value.assign(&mut self.tags, column),
            "attrs" => value.assign(&mut self.attrs, column),
            "address_street" => value.assign(&mut self.address.street, column),
            "address_city" => value.assign(&mut self.address.city, column),
            _ => Err(unknown_column("Person", column)),
        }
    }

    fn relation(&self, name: &str) -> Option<&dyn RelationSlot> {
        match name {
            "pets" => Some(&self.pets),
            "profile" => Some(&self.profile),
            _ => None,
        }
    }

    fn relation_mut(&mut self, name: &str) -> Option<&mut dyn RelationSlot> {
        match name {
            "pets" => Some(&mut self.pets),
            "profile" => Some(&mut self.profile),
            _ => None,
        }
    }

    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }

    fn hooks(&self) -> HookSet {
        self.lifecycle.declared
    }

    fn run_hook(&mut self, hook: Hook) -> std::result::Result<(), HookFailure> {
        self.lifecycle.run("Person", hook)
    }
}

impl Model for Person {
    const NAME: &'static str = "Person";
}

// ============================================================================
// Pet
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Pet {
    pub id: i64,
    pub name: String,
    pub species: String,
    pub state: RecordState,
    pub lifecycle: Lifecycle,
}

impl Pet {
    pub fn new(name: &str, species: &str) -> Self {
        Self {
            name: name.to_string(),
            species: species.to_string(),
            ..Self::default()
        }
    }
}

impl Record for Pet {
    fn model_name(&self) -> &'static str {
        "Pet"
    }

    fn primary_key(&self) -> Value {
        Value::from(self.id)
    }

    fn set_primary_key(&mut self, value: Value) -> Result<()> {
        value.assign(&mut self.id, "id")
    }

    fn get(&self, column: &str) -> Result<Value> {
        Ok(match column {
            "id" => Value::from(self.id),
            "name" => Value::from(self.name.as_str()),
            "species" => Value::from(self.species.as_str()),
            _ => return Err(unknown_column("Pet", column)),
        })
    }

    fn set(&mut self, column: &str, value: Value) -> Result<()> {
        match column {
            "id" => value.assign(&mut self.id, column),
            "name" => value.assign(&mut self.name, column),
            "species" => value.assign(&mut self.species, column),
            _ => Err(unknown_column("Pet", column)),
        }
    }

    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }

    fn hooks(&self) -> HookSet {
        self.lifecycle.declared
    }

    fn run_hook(&mut self, hook: Hook) -> std::result::Result<(), HookFailure> {
        self.lifecycle.run("Pet", hook)
    }
}

impl Model for Pet {
    const NAME: &'static str = "Pet";
}

// ============================================================================
// Profile
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub id: i64,
    pub person_id: Option<i64>,
    pub bio: String,
    pub state: RecordState,
}

impl Profile {
    pub fn new(bio: &str) -> Self {
        Self {
            bio: bio.to_string(),
            ..Self::default()
        }
    }
}

impl Record for Profile {
    fn model_name(&self) -> &'static str {
        "Profile"
    }

    fn primary_key(&self) -> Value {
        Value::from(self.id)
    }

    fn set_primary_key(&mut self, value: Value) -> Result<()> {
        value.assign(&mut self.id, "id")
    }

    fn get(&self, column: &str) -> Result<Value> {
        Ok(match column {
            "id" => Value::from(self.id),
            "person_id" => Value::from(self.person_id),
            "bio" => Value::from(self.bio.as_str()),
            _ => return Err(unknown_column("Profile", column)),
        })
    }

    fn set(&mut self, column: &str, value: Value) -> Result<()> {
        match column {
            "id" => value.assign(&mut self.id, column),
            "person_id" => value.assign(&mut self.person_id, column),
            "bio" => value.assign(&mut self.bio, column),
            _ => Err(unknown_column("Profile", column)),
        }
    }

    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }
}

impl Model for Profile {
    const NAME: &'static str = "Profile";
}

// ============================================================================
// Ticket
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Ticket {
    pub id: i64,
    pub title: String,
    pub person_id: Option<i64>,
    pub owner: Related<Person>,
    pub state: RecordState,
}

impl Record for Ticket {
    fn model_name(&self) -> &'static str {
        "Ticket"
    }

    fn primary_key(&self) -> Value {
        Value::from(self.id)
    }

    fn set_primary_key(&mut self, value: Value) -> Result<()> {
        value.assign(&mut self.id, "id")
    }

    fn get(&self, column: &str) -> Result<Value> {
        Ok(match column {
            "id" => Value::from(self.id),
            "title" => Value::from(self.title.as_str()),
            "person_id" => Value::from(self.person_id),
            _ => return Err(unknown_column("Ticket", column)),
        })
    }

    fn set(&mut self, column: &str, value: Value) -> Result<()> {
        match column {
            "id" => value.assign(&mut self.id, column),
            "title" => value.assign(&mut self.title, column),
            "person_id" => value.assign(&mut self.person_id, column),
            _ => Err(unknown_column("Ticket", column)),
        }
    }

    fn relation(&self, name: &str) -> Option<&dyn RelationSlot> {
        (name == "owner").then_some(&self.owner as &dyn RelationSlot)
    }

    fn relation_mut(&mut self, name: &str) -> Option<&mut dyn RelationSlot> {
        if name == "owner" {
            Some(&mut self.owner)
        } else {
            None
        }
    }

    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }
}

impl Model for Ticket {
    const NAME: &'static str = "Ticket";
}

// ============================================================================
// Schema and connection
// ============================================================================

pub fn schema() -> Arc<Schema> {
    let schema = Schema::builder()
        .model(
            ModelDescriptor::builder("Person")
                .field(FieldDescriptor::scalar("id", SqlType::BigInt).primary_key().auto_increment())
                .field(FieldDescriptor::scalar("name", SqlType::Text))
                .field(FieldDescriptor::scalar("age", SqlType::Int).nullable(true))
                .field(FieldDescriptor::array("tags", SqlType::Text))
                .field(FieldDescriptor::json("attrs").nullable(true))
                .field(FieldDescriptor::inline(
                    "address",
                    vec![
                        FieldDescriptor::scalar("street", SqlType::Text),
                        FieldDescriptor::scalar("city", SqlType::Text),
                    ],
                ))
                .relationship(RelationshipDescriptor::one_to_many("pets", "Pet"))
                .relationship(RelationshipDescriptor::one_to_one("profile", "Profile")),
        )
        .model(
            ModelDescriptor::builder("Pet")
                .field(FieldDescriptor::scalar("id", SqlType::BigInt).primary_key().auto_increment())
                .field(FieldDescriptor::scalar("name", SqlType::Text))
                .field(FieldDescriptor::scalar("species", SqlType::Text)),
        )
        .model(
            ModelDescriptor::builder("Profile")
                .field(FieldDescriptor::scalar("id", SqlType::BigInt).primary_key().auto_increment())
                .field(FieldDescriptor::scalar("personId", SqlType::BigInt).nullable(true))
                .field(FieldDescriptor::scalar("bio", SqlType::Text)),
        )
        .model(
            ModelDescriptor::builder("Ticket")
                .field(FieldDescriptor::scalar("id", SqlType::BigInt).primary_key().auto_increment())
                .field(FieldDescriptor::scalar("title", SqlType::Text))
                .field(FieldDescriptor::scalar("personId", SqlType::BigInt).nullable(true))
                .relationship(RelationshipDescriptor::one_to_one("owner", "Person").forward()),
        )
        .build()
        .expect("test schema is valid");
    Arc::new(schema)
}

pub fn setup() -> (Arc<Schema>, MemoryConnection) {
    let schema = schema();
    let conn = MemoryConnection::with_schema(&schema);
    (schema, conn)
}
