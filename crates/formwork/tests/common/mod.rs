//! Shared fixtures: a store with customers, houses and their rooms.
#![allow(dead_code)]

use formwork::store::{MemoryStore, Model, ModelSchema};
use formwork::{AttributeType, ErrorSet, Params, Value};
use std::cell::RefCell;
use std::rc::Rc;

pub struct TestEnv {
    pub store: Rc<MemoryStore>,
    pub customers: Rc<ModelSchema>,
    pub houses: Rc<ModelSchema>,
    pub house_rooms: Rc<ModelSchema>,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        let customers = Rc::new(
            ModelSchema::new("customers")
                .field("name", AttributeType::string())
                .field("email", AttributeType::string())
                .field("phone_number", AttributeType::string())
                .field("friendly", AttributeType::boolean().with_default(true))
                .field("password_digest", AttributeType::string())
                .field("date_of_birth", AttributeType::date())
                .field("married_at", AttributeType::datetime())
                .validates_presence_of(["name", "email", "phone_number"])
                .validate(|model, errors| {
                    if !model.get("friendly").is_truthy() {
                        errors.add(ErrorSet::BASE, "Customer needs to be friendly");
                    }
                }),
        );
        let house_rooms = Rc::new(
            ModelSchema::new("house_rooms")
                .field("house_id", AttributeType::integer())
                .field("name", AttributeType::string())
                .field("area", AttributeType::integer())
                .validates_presence_of(["name"]),
        );
        let houses = Rc::new(
            ModelSchema::new("houses")
                .field("vendor_id", AttributeType::integer())
                .field("street_number", AttributeType::integer())
                .field("street_name", AttributeType::string())
                .field("city", AttributeType::string())
                .field("listing_approved", AttributeType::boolean().with_default(false))
                .validates_presence_of(["street_number", "street_name", "city"])
                .has_many("house_rooms", &house_rooms, "house_id"),
        );
        Self {
            store: Rc::new(MemoryStore::new()),
            customers,
            houses,
            house_rooms,
        }
    }

    pub fn new_customer(&self) -> Rc<RefCell<Model>> {
        Model::new(&self.store, &self.customers).shared()
    }

    pub fn new_house(&self) -> Rc<RefCell<Model>> {
        Model::new(&self.store, &self.houses).shared()
    }

    /// A saved, valid customer.
    pub fn create_customer(&self, name: &str) -> Rc<RefCell<Model>> {
        let attributes = [
            ("name", Value::from(name)),
            ("email", Value::from(format!("{}@example.com", name.to_lowercase()))),
            ("phone_number", Value::from("555-0100")),
        ];
        Model::create(&self.store, &self.customers, attributes).expect("valid customer")
    }

    /// A saved house with one saved room per name, in order.
    pub fn create_house_with_rooms(&self, rooms: &[&str]) -> Rc<RefCell<Model>> {
        let house = Model::create(
            &self.store,
            &self.houses,
            [
                ("street_number", Value::Int(12)),
                ("street_name", Value::from("Main Street")),
                ("city", Value::from("Springfield")),
            ],
        )
        .expect("valid house");
        let house_id = house.borrow().get("id");
        for name in rooms {
            Model::create(
                &self.store,
                &self.house_rooms,
                [("house_id", house_id.clone()), ("name", Value::from(*name))],
            )
            .expect("valid room");
        }
        house
    }

    /// Ids of the rooms stored for `house_id`, in insertion order.
    pub fn room_ids(&self, house_id: i64) -> Vec<i64> {
        self.store
            .select("house_rooms", |row| {
                row.get("house_id") == Some(&Value::Int(house_id))
            })
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    pub fn room_names(&self, house_id: i64) -> Vec<String> {
        self.store
            .select("house_rooms", |row| {
                row.get("house_id") == Some(&Value::Int(house_id))
            })
            .into_iter()
            .map(|(_, row)| row.get("name").map(ToString::to_string).unwrap_or_default())
            .collect()
    }
}

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a parameter map from JSON.
pub fn params(json: serde_json::Value) -> Value {
    Value::from(json)
}

pub fn map(json: serde_json::Value) -> Params {
    match Value::from(json) {
        Value::Map(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}
