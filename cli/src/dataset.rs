//! The in-memory demo dataset the CLI runs against: three related objects
//! (`Account`, `Contact`, `Opportunity`), their metadata, and the rows a
//! [`dsql_engine::driver::MockDriver`] hands back when the generated SQL
//! mentions one of their tables.

use std::collections::HashMap;

use dsql_engine::{
    DataType, FieldMetadata, InMemoryMetadata, ObjName, ObjectMetadata, Relationship, RelationshipKind, Row,
    Value,
};

fn field(field_name: &str, column_name: &str, data_type: DataType, nullable: bool, indexed: bool, selectivity: f64) -> FieldMetadata {
    FieldMetadata {
        field_name: field_name.into(),
        column_name: column_name.into(),
        data_type,
        nullable,
        indexed,
        selectivity,
    }
}

/// Builds the metadata catalog for `Account`/`Contact`/`Opportunity`.
pub fn metadata() -> InMemoryMetadata {
    let mut meta = InMemoryMetadata::new();

    let mut account_fields = HashMap::new();
    account_fields.insert("Id".into(), field("Id", "id", DataType::Id, false, true, 0.001));
    account_fields.insert("Name".into(), field("Name", "name", DataType::String, false, true, 0.2));
    account_fields.insert("Industry".into(), field("Industry", "industry", DataType::String, true, true, 0.1));
    account_fields.insert(
        "AnnualRevenue".into(),
        field("AnnualRevenue", "annual_revenue", DataType::Number, true, false, 0.3),
    );
    meta.insert(ObjectMetadata {
        object_name: ObjName::new("Account"),
        table_name: "accounts".into(),
        fields: account_fields,
        relationships: vec![
            Relationship {
                name: "Contacts".into(),
                target_object: ObjName::new("Contact"),
                foreign_key: "account_id".into(),
                referenced_key: "id".into(),
                kind: RelationshipKind::ChildrenOf,
            },
            Relationship {
                name: "Opportunities".into(),
                target_object: ObjName::new("Opportunity"),
                foreign_key: "account_id".into(),
                referenced_key: "id".into(),
                kind: RelationshipKind::ChildrenOf,
            },
        ],
        has_rls: true,
        estimated_row_count: 3,
    });

    let mut contact_fields = HashMap::new();
    contact_fields.insert("Id".into(), field("Id", "id", DataType::Id, false, true, 0.001));
    contact_fields.insert("Name".into(), field("Name", "name", DataType::String, false, true, 0.2));
    contact_fields.insert("Email".into(), field("Email", "email", DataType::String, true, true, 0.9));
    contact_fields.insert("AccountId".into(), field("AccountId", "account_id", DataType::Id, true, true, 0.3));
    meta.insert(ObjectMetadata {
        object_name: ObjName::new("Contact"),
        table_name: "contacts".into(),
        fields: contact_fields,
        relationships: vec![Relationship {
            name: "Account".into(),
            target_object: ObjName::new("Account"),
            foreign_key: "account_id".into(),
            referenced_key: "id".into(),
            kind: RelationshipKind::ParentOf,
        }],
        has_rls: false,
        estimated_row_count: 4,
    });

    let mut opportunity_fields = HashMap::new();
    opportunity_fields.insert("Id".into(), field("Id", "id", DataType::Id, false, true, 0.001));
    opportunity_fields.insert("Name".into(), field("Name", "name", DataType::String, false, true, 0.2));
    opportunity_fields.insert("Amount".into(), field("Amount", "amount", DataType::Number, true, false, 0.3));
    opportunity_fields.insert("StageName".into(), field("StageName", "stage_name", DataType::String, false, true, 0.2));
    opportunity_fields.insert("AccountId".into(), field("AccountId", "account_id", DataType::Id, true, true, 0.3));
    meta.insert(ObjectMetadata {
        object_name: ObjName::new("Opportunity"),
        table_name: "opportunities".into(),
        fields: opportunity_fields,
        relationships: vec![Relationship {
            name: "Account".into(),
            target_object: ObjName::new("Account"),
            foreign_key: "account_id".into(),
            referenced_key: "id".into(),
            kind: RelationshipKind::ParentOf,
        }],
        has_rls: false,
        estimated_row_count: 3,
    });

    meta
}

fn row(pairs: &[(&str, Value)]) -> Row {
    let mut r = Row::new();
    for (k, v) in pairs {
        r.insert((*k).to_string(), v.clone());
    }
    r
}

/// Registers the demo rows on a [`dsql_engine::driver::MockDriver`], keyed
/// by the table name that appears in a generated `FROM`/`JOIN` clause.
pub fn seed(driver: &mut dsql_engine::driver::MockDriver) {
    driver.fixture(
        "accounts",
        vec![
            row(&[
                ("id", Value::Int(1)),
                ("name", Value::Str("Acme Corp".into())),
                ("industry", Value::Str("Manufacturing".into())),
                ("annual_revenue", Value::Float(12_500_000.0)),
            ]),
            row(&[
                ("id", Value::Int(2)),
                ("name", Value::Str("Globex".into())),
                ("industry", Value::Str("Technology".into())),
                ("annual_revenue", Value::Float(48_000_000.0)),
            ]),
            row(&[
                ("id", Value::Int(3)),
                ("name", Value::Str("Initech".into())),
                ("industry", Value::Null),
                ("annual_revenue", Value::Null),
            ]),
        ],
    );

    driver.fixture(
        "contacts",
        vec![
            row(&[
                ("id", Value::Int(1)),
                ("name", Value::Str("Alice Nguyen".into())),
                ("email", Value::Str("alice@acme.example".into())),
                ("account_id", Value::Int(1)),
            ]),
            row(&[
                ("id", Value::Int(2)),
                ("name", Value::Str("Bob Wei".into())),
                ("email", Value::Str("bob@globex.example".into())),
                ("account_id", Value::Int(2)),
            ]),
        ],
    );

    driver.fixture(
        "opportunities",
        vec![
            row(&[
                ("id", Value::Int(1)),
                ("name", Value::Str("Acme renewal".into())),
                ("amount", Value::Float(75_000.0)),
                ("stage_name", Value::Str("Negotiation".into())),
                ("account_id", Value::Int(1)),
            ]),
            row(&[
                ("id", Value::Int(2)),
                ("name", Value::Str("Globex expansion".into())),
                ("amount", Value::Float(220_000.0)),
                ("stage_name", Value::Str("Closed Won".into())),
                ("account_id", Value::Int(2)),
            ]),
        ],
    );
}
