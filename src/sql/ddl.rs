//! Table and read-view DDL for a model, aware of its place in the hierarchy.

use crate::config::{Settings, TableLayout};
use crate::error::ConfigError;
use crate::schema::{FieldType, ModelDescriptor, Registry, ID_FIELD, TYPE_FIELD};
use crate::sql::builder::{quoted, table_name, view_name};

/// A SQL string literal.
fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn column_def(name: &str, ty: &FieldType) -> String {
    format!("{} {}", quoted(name), ty.pg_type())
}

/// `_type` column defaulting to the model's own name. Names are plain
/// identifiers, so inlining the literal is safe.
fn discriminator_def(model: &ModelDescriptor) -> String {
    format!(
        "{} TEXT NOT NULL DEFAULT '{}'",
        quoted(TYPE_FIELD),
        model.name()
    )
}

/// CREATE TABLE for one model.
///
/// Roots own the id sequence. Subtypes either inherit the parent table or,
/// under [`TableLayout::Duplicate`], repeat every column and draw ids from
/// the root's sequence so ids stay unique across the hierarchy.
pub fn create_table(
    model: &ModelDescriptor,
    registry: &Registry,
    settings: &Settings,
) -> Result<String, ConfigError> {
    let table = table_name(model, settings);
    let mut defs: Vec<String> = Vec::new();
    let mut inherits = String::new();

    match (model.parent(), settings.layout) {
        (None, _) => {
            defs.push(format!("{} BIGSERIAL PRIMARY KEY", quoted(ID_FIELD)));
            for (name, ty) in model.columns() {
                if name == TYPE_FIELD {
                    defs.push(discriminator_def(model));
                } else {
                    defs.push(column_def(name, ty));
                }
            }
        }
        (Some(parent), TableLayout::Inherit) => {
            let parent = registry.model(parent)?;
            for (name, ty) in model.columns() {
                if name == TYPE_FIELD {
                    defs.push(discriminator_def(model));
                    continue;
                }
                match parent.field_type(name) {
                    Some(pty) if pty == ty => {}
                    Some(pty) => {
                        return Err(ConfigError::Validation(format!(
                            "model '{}' changes the type of inherited field '{}' from {} to {}",
                            model.name(),
                            name,
                            pty,
                            ty
                        )))
                    }
                    None => defs.push(column_def(name, ty)),
                }
            }
            defs.push(format!("PRIMARY KEY ({})", quoted(ID_FIELD)));
            inherits = format!(" INHERITS ({})", table_name(parent, settings));
        }
        (Some(_), TableLayout::Duplicate) => {
            let root = registry.model(model.root_name())?;
            defs.push(format!(
                "{} BIGINT PRIMARY KEY DEFAULT nextval(pg_get_serial_sequence({}, {}))",
                quoted(ID_FIELD),
                literal(&table_name(root, settings)),
                literal(ID_FIELD)
            ));
            for (name, ty) in model.columns() {
                if name == TYPE_FIELD {
                    defs.push(discriminator_def(model));
                } else {
                    defs.push(column_def(name, ty));
                }
            }
        }
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n){}",
        table,
        defs.join(",\n  "),
        inherits
    ))
}

/// Projection of `model`'s columns out of `source`'s table. Columns that
/// `source` narrowed away come out as typed NULLs.
fn projection(model: &ModelDescriptor, source: &ModelDescriptor) -> Vec<String> {
    let mut cols = vec![quoted(ID_FIELD)];
    for (name, ty) in model.columns() {
        if source.has_field(name) {
            cols.push(quoted(name));
        } else {
            cols.push(format!("NULL::{} AS {}", ty.pg_type(), quoted(name)));
        }
    }
    cols
}

/// CREATE VIEW for one model. The view always exposes `_type`: synthesized
/// for models outside any hierarchy, stored otherwise.
pub fn create_view(
    model: &ModelDescriptor,
    registry: &Registry,
    settings: &Settings,
) -> Result<String, ConfigError> {
    let view = view_name(model, settings);
    let body = if !model.has_discriminator() {
        let mut cols = projection(model, model);
        cols.push(format!("'{}'::text AS {}", model.name(), quoted(TYPE_FIELD)));
        format!("SELECT {} FROM {}", cols.join(", "), table_name(model, settings))
    } else {
        match settings.layout {
            TableLayout::Inherit => format!(
                "SELECT {} FROM {}",
                projection(model, model).join(", "),
                table_name(model, settings)
            ),
            TableLayout::Duplicate => {
                let mut parts = vec![format!(
                    "SELECT {} FROM ONLY {}",
                    projection(model, model).join(", "),
                    table_name(model, settings)
                )];
                for d in registry.descendants(model.name()) {
                    parts.push(format!(
                        "SELECT {} FROM ONLY {}",
                        projection(model, d).join(", "),
                        table_name(d, settings)
                    ));
                }
                parts.join(" UNION ALL ")
            }
        }
    };
    Ok(format!("CREATE OR REPLACE VIEW {} AS {}", view, body))
}

pub fn drop_table(model: &ModelDescriptor, settings: &Settings) -> String {
    format!("DROP TABLE IF EXISTS {} CASCADE", table_name(model, settings))
}

pub fn drop_view(model: &ModelDescriptor, settings: &Settings) -> String {
    format!("DROP VIEW IF EXISTS {}", view_name(model, settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelDefinition;

    fn registry() -> Registry {
        let mut b = Registry::builder();
        b.define(
            ModelDefinition::new("Parent")
                .table("parents")
                .field("title", FieldType::Text),
        )
        .unwrap();
        b.define(
            ModelDefinition::new("Child")
                .extends("Parent")
                .table("children")
                .field("ctitle", FieldType::Text),
        )
        .unwrap();
        b.define(
            ModelDefinition::new("Car")
                .table("cars")
                .field("tags", FieldType::array_of(FieldType::Text)),
        )
        .unwrap();
        b.build().unwrap()
    }

    #[test]
    fn plain_root_synthesizes_discriminator_in_view() {
        let reg = registry();
        let car = reg.model("Car").unwrap();
        let s = Settings::default();
        assert_eq!(
            create_table(car, &reg, &s).unwrap(),
            "CREATE TABLE IF NOT EXISTS \"public\".\"cars\" (\n  \"id\" BIGSERIAL PRIMARY KEY,\n  \"tags\" text[]\n)"
        );
        assert_eq!(
            create_view(car, &reg, &s).unwrap(),
            "CREATE OR REPLACE VIEW \"public\".\"v_cars\" AS SELECT \"id\", \"tags\", 'Car'::text AS \"_type\" FROM \"public\".\"cars\""
        );
    }

    #[test]
    fn root_with_subtypes_stores_discriminator() {
        let reg = registry();
        let parent = reg.model("Parent").unwrap();
        let s = Settings::default();
        let ddl = create_table(parent, &reg, &s).unwrap();
        assert!(ddl.contains("\"_type\" TEXT NOT NULL DEFAULT 'Parent'"));
        assert_eq!(
            create_view(parent, &reg, &s).unwrap(),
            "CREATE OR REPLACE VIEW \"public\".\"v_parents\" AS SELECT \"id\", \"title\", \"_type\" FROM \"public\".\"parents\""
        );
    }

    #[test]
    fn subtype_inherits_parent_table() {
        let reg = registry();
        let child = reg.model("Child").unwrap();
        let ddl = create_table(child, &reg, &Settings::default()).unwrap();
        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS \"public\".\"children\" (\n  \"_type\" TEXT NOT NULL DEFAULT 'Child',\n  \"ctitle\" text,\n  PRIMARY KEY (\"id\")\n) INHERITS (\"public\".\"parents\")"
        );
    }

    #[test]
    fn duplicate_layout_copies_columns_and_unions_views() {
        let reg = registry();
        let s = Settings {
            layout: TableLayout::Duplicate,
            ..Settings::default()
        };
        let child_ddl = create_table(reg.model("Child").unwrap(), &reg, &s).unwrap();
        assert!(child_ddl.contains(
            "DEFAULT nextval(pg_get_serial_sequence('\"public\".\"parents\"', 'id'))"
        ));
        assert!(child_ddl.contains("\"title\" text"));
        assert!(!child_ddl.contains("INHERITS"));

        let view = create_view(reg.model("Parent").unwrap(), &reg, &s).unwrap();
        assert_eq!(
            view,
            "CREATE OR REPLACE VIEW \"public\".\"v_parents\" AS SELECT \"id\", \"title\", \"_type\" FROM ONLY \"public\".\"parents\" UNION ALL SELECT \"id\", \"title\", \"_type\" FROM ONLY \"public\".\"children\""
        );
    }

    #[test]
    fn mixed_case_root_keeps_its_case_in_the_sequence_lookup() {
        let mut b = Registry::builder();
        b.define(ModelDefinition::new("Shape").table("Shapes").field("name", FieldType::Text))
            .unwrap();
        b.define(ModelDefinition::new("Circle").extends("Shape").table("Circles"))
            .unwrap();
        let reg = b.build().unwrap();
        let s = Settings {
            schema: "Drawing".into(),
            layout: TableLayout::Duplicate,
            ..Settings::default()
        };
        let ddl = create_table(reg.model("Circle").unwrap(), &reg, &s).unwrap();
        assert!(
            ddl.contains("pg_get_serial_sequence('\"Drawing\".\"Shapes\"', 'id')"),
            "{}",
            ddl
        );
        assert_eq!(literal("it's"), "'it''s'");
    }

    #[test]
    fn drops_are_separate_statements() {
        let reg = registry();
        let car = reg.model("Car").unwrap();
        let s = Settings::default();
        assert_eq!(drop_table(car, &s), "DROP TABLE IF EXISTS \"public\".\"cars\" CASCADE");
        assert_eq!(drop_view(car, &s), "DROP VIEW IF EXISTS \"public\".\"v_cars\"");
    }
}
