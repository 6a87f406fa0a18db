#![allow(dead_code)]

use pantry_storage::{Storable, Table, Value, Viewable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub name: String,
}

impl Viewable for Owner {
    const TABLE: Table = Table::new("owners", "owner_id");

    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, key: &str) -> Value {
        match key {
            "name" => Value::from(&self.name),
            _ => Value::Null,
        }
    }
}

impl Storable for Owner {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pet {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub age: i64,
}

impl Viewable for Pet {
    const TABLE: Table = Table::new("pets", "pet_id");

    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, key: &str) -> Value {
        match key {
            "owner_id" => Value::from(&self.owner_id),
            "name" => Value::from(&self.name),
            "age" => Value::from(self.age),
            _ => Value::Null,
        }
    }
}

impl Storable for Pet {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toy {
    pub id: String,
    pub name: String,
}

impl Viewable for Toy {
    const TABLE: Table = Table::new("toys", "toy_id");

    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, key: &str) -> Value {
        match key {
            "name" => Value::from(&self.name),
            _ => Value::Null,
        }
    }
}

impl Storable for Toy {}

/// Join row between pets and toys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetToy {
    pub id: String,
    pub pet_id: String,
    pub toy_id: String,
}

impl Viewable for PetToy {
    const TABLE: Table = Table::new("pet_toys", "pet_toy_id");

    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, key: &str) -> Value {
        match key {
            "pet_id" => Value::from(&self.pet_id),
            "toy_id" => Value::from(&self.toy_id),
            _ => Value::Null,
        }
    }
}

impl Storable for PetToy {}

pub fn owner(id: &str, name: &str) -> Owner {
    Owner {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub fn pet(id: &str, owner_id: &str, name: &str, age: i64) -> Pet {
    Pet {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        name: name.to_string(),
        age,
    }
}

pub fn toy(id: &str, name: &str) -> Toy {
    Toy {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub fn pet_toy(id: &str, pet_id: &str, toy_id: &str) -> PetToy {
    PetToy {
        id: id.to_string(),
        pet_id: pet_id.to_string(),
        toy_id: toy_id.to_string(),
    }
}
