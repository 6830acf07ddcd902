//! Shared fixtures for the unit tests in this crate.

use sqlx::Row;
use sqlx::postgres::{PgPoolOptions, PgRow};
use uuid::Uuid;

use groundwork_core::{AggregateRoot, Entity};

use crate::context::PersistenceContext;
use crate::error::{PersistenceError, PersistenceResult};
use crate::mapping::EntityRow;
use crate::model::builder::{ColumnType, EntityTypeBuilder};
use crate::model::configuration::{DerivedEntityTypeConfiguration, EntityTypeConfiguration};
use crate::model::Model;
use crate::value::{RowValues, SqlValue};

#[derive(Debug, Clone)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
}

impl Entity for Customer {
    type Key = Uuid;

    fn key(&self) -> &Uuid {
        &self.id
    }
}

impl AggregateRoot for Customer {}

impl EntityRow for Customer {
    fn entity_name() -> &'static str {
        "customer"
    }

    fn key_value(&self) -> SqlValue {
        SqlValue::Uuid(self.id)
    }

    fn to_row(&self) -> RowValues {
        RowValues::new().set("id", self.id).set("name", self.name.clone())
    }

    fn from_row(row: &PgRow) -> PersistenceResult<Self> {
        Ok(Self {
            id: row
                .try_get("id")
                .map_err(|e| PersistenceError::decode("customer", e))?,
            name: row
                .try_get("name")
                .map_err(|e| PersistenceError::decode("customer", e))?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct VipCustomer {
    pub id: Uuid,
    pub name: String,
    pub tier: i32,
}

impl Entity for VipCustomer {
    type Key = Uuid;

    fn key(&self) -> &Uuid {
        &self.id
    }
}

impl AggregateRoot for VipCustomer {}

impl EntityRow for VipCustomer {
    fn entity_name() -> &'static str {
        "vip_customer"
    }

    fn key_value(&self) -> SqlValue {
        SqlValue::Uuid(self.id)
    }

    fn to_row(&self) -> RowValues {
        RowValues::new()
            .set("id", self.id)
            .set("name", self.name.clone())
            .set("tier", self.tier)
    }

    fn from_row(row: &PgRow) -> PersistenceResult<Self> {
        Ok(Self {
            id: row
                .try_get("id")
                .map_err(|e| PersistenceError::decode("vip_customer", e))?,
            name: row
                .try_get("name")
                .map_err(|e| PersistenceError::decode("vip_customer", e))?,
            tier: row
                .try_get("tier")
                .map_err(|e| PersistenceError::decode("vip_customer", e))?,
        })
    }
}

pub struct CustomerConfig;

impl EntityTypeConfiguration<Customer> for CustomerConfig {
    fn configure_entity(&self, builder: &mut EntityTypeBuilder<Customer>) {
        builder.property("name", ColumnType::Text).required();
    }
}

pub struct VipConfig;

impl DerivedEntityTypeConfiguration<VipCustomer> for VipConfig {
    type Base = Customer;

    fn configure_entity(&self, builder: &mut EntityTypeBuilder<VipCustomer>) {
        builder.property("tier", ColumnType::Integer).required();
    }
}

/// Customer + VipCustomer hierarchy, default conventions.
pub fn model() -> Model {
    let mut builder = Model::builder();
    builder.apply(&CustomerConfig);
    builder.apply_derived(&VipConfig);
    builder.build().expect("valid test model")
}

/// Context over a lazy pool: constructible without a running server, fails
/// only if a test actually reaches the engine.
pub fn lazy_context() -> PersistenceContext {
    lazy_context_with(model())
}

pub fn lazy_context_with(model: Model) -> PersistenceContext {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost:5432/groundwork_test")
        .expect("lazy pool");
    PersistenceContext::new(pool, model)
}

pub fn sample_customer(name: &str) -> Customer {
    Customer {
        id: Uuid::new_v4(),
        name: name.to_string(),
    }
}
