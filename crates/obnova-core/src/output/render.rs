//! Schema text rendering.
//!
//! Emits the final `.proto` source for one [`OutputFile`] in a fixed order:
//! syntax declaration, package, imports, namespace option, then root
//! messages and root enums. Message bodies are recursive — fields in
//! discovery order, oneof blocks, nested enums, nested messages — with two
//! spaces of indentation per nesting level.
//!
//! A field whose type the mapping cannot express does not fail the run: it
//! degrades to an opaque `bytes` field annotated with the unresolved
//! metadata type name.

use super::OutputFile;
use crate::error::Result;
use crate::mapping::{pascal_to_lower_snake, pascal_to_upper_snake, proto_type};
use crate::metadata::RuntimeTypes;
use crate::model::{EnumId, Field, MessageId, TypeRegistry};
use tracing::warn;

/// Renders the complete schema text of one output file.
pub fn render_file(
    registry: &TypeRegistry,
    runtime: &RuntimeTypes,
    file: &OutputFile,
) -> Result<String> {
    let mut out = String::new();
    out.push_str("syntax = \"proto3\";\n");

    if !file.package_name.is_empty() {
        out.push_str(&format!("package {};\n", file.package_name));
    }

    for import in &file.imports {
        out.push_str(&format!("import \"{import}\";\n"));
    }

    if !file.namespace.is_empty() {
        out.push_str(&format!(
            "option csharp_namespace = \"{}\";\n",
            file.namespace
        ));
    }

    for &message in &file.messages {
        render_message(&mut out, registry, runtime, message, 0)?;
    }

    for &enum_id in &file.enums {
        render_enum(&mut out, registry, enum_id, 0);
    }

    Ok(out)
}

fn render_message(
    out: &mut String,
    registry: &TypeRegistry,
    runtime: &RuntimeTypes,
    id: MessageId,
    depth: usize,
) -> Result<()> {
    let message = registry.message(id);

    out.push('\n');
    push_indent(out, depth);
    out.push_str(&format!("message {} {{\n", message.name));

    for field in &message.fields {
        render_field(out, registry, runtime, &message.name, field, depth + 1)?;
    }

    for oneof in &message.oneofs {
        push_indent(out, depth + 1);
        out.push_str(&format!("oneof {} {{\n", pascal_to_lower_snake(&oneof.name)));
        for field in &oneof.members {
            render_field(out, registry, runtime, &message.name, field, depth + 2)?;
        }
        push_indent(out, depth + 1);
        out.push_str("}\n");
    }

    for &nested_enum in &message.nested_enums {
        render_enum(out, registry, nested_enum, depth + 1);
    }

    for &nested_message in &message.nested_messages {
        render_message(out, registry, runtime, nested_message, depth + 1)?;
    }

    push_indent(out, depth);
    out.push_str("}\n");
    Ok(())
}

fn render_field(
    out: &mut String,
    registry: &TypeRegistry,
    runtime: &RuntimeTypes,
    message_name: &str,
    field: &Field,
    depth: usize,
) -> Result<()> {
    push_indent(out, depth);
    let field_name = pascal_to_lower_snake(&field.name);

    match proto_type(registry, runtime, &field.value_type)? {
        Some(mapped) => {
            out.push_str(&format!(
                "{} {} = {};\n",
                mapped.name, field_name, field.number
            ));
        }
        None => {
            warn!(
                "Using 'bytes' for unknown type {} (found in field {} of message {})",
                field.value_type.full_name, field.number, message_name
            );
            out.push_str(&format!(
                "bytes {} = {}; // Unknown type: {}\n",
                field_name, field.number, field.value_type.full_name
            ));
        }
    }
    Ok(())
}

fn render_enum(out: &mut String, registry: &TypeRegistry, id: EnumId, depth: usize) {
    let enum_type = registry.enum_type(id);

    out.push('\n');
    push_indent(out, depth);
    out.push_str(&format!("enum {} {{\n", enum_type.name));

    let prefix = pascal_to_upper_snake(&enum_type.name);
    // the zero value must come first, then ascending
    let mut pairs = enum_type.pairs.clone();
    pairs.sort_by_key(|&(_, value)| (value != 0, value));

    for (name, value) in pairs {
        push_indent(out, depth + 1);
        out.push_str(&format!(
            "{}_{} = {};\n",
            prefix,
            pascal_to_upper_snake(&name),
            value
        ));
    }

    push_indent(out, depth);
    out.push_str("}\n");
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EnumType, MessageType, Oneof};
    use crate::metadata::TypeRef;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn runtime() -> RuntimeTypes {
        RuntimeTypes::google_protobuf()
    }

    fn field(name: &str, number: i32, value_type: &str) -> Field {
        Field {
            name: name.to_string(),
            number,
            value_type: TypeRef::named(value_type),
            is_oneof_member: false,
            has_presence: false,
        }
    }

    fn file_for(messages: Vec<MessageId>, enums: Vec<EnumId>) -> OutputFile {
        OutputFile {
            file_name: "app.proto".to_string(),
            package_name: "app".to_string(),
            namespace: "App".to_string(),
            imports: BTreeSet::new(),
            messages,
            enums,
        }
    }

    #[test]
    fn test_render_simple_message() {
        let mut registry = TypeRegistry::new();
        let mut person = MessageType::new("App.Person", "Person", "App", None);
        person.fields.push(field("Name", 1, "System.String"));
        person.fields.push(field("Age", 2, "System.Int32"));
        let person = registry.add_message(person);

        let rendered =
            render_file(&registry, &runtime(), &file_for(vec![person], vec![])).unwrap();
        assert_eq!(
            rendered,
            "syntax = \"proto3\";\n\
             package app;\n\
             option csharp_namespace = \"App\";\n\
             \n\
             message Person {\n\
             \x20 string name = 1;\n\
             \x20 int32 age = 2;\n\
             }\n"
        );
    }

    #[test]
    fn test_render_imports_in_order() {
        let mut registry = TypeRegistry::new();
        let message = registry.add_message(MessageType::new("App.A", "A", "App", None));

        let mut file = file_for(vec![message], vec![]);
        file.imports.insert("zeta.proto".to_string());
        file.imports.insert("alpha.proto".to_string());

        let rendered = render_file(&registry, &runtime(), &file).unwrap();
        let alpha = rendered.find("import \"alpha.proto\";").unwrap();
        let zeta = rendered.find("import \"zeta.proto\";").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn test_render_unmappable_field_degrades_to_bytes() {
        let mut registry = TypeRegistry::new();
        let mut message = MessageType::new("App.A", "A", "App", None);
        message.fields.push(field("When", 4, "System.DateTime"));
        let message = registry.add_message(message);

        let rendered =
            render_file(&registry, &runtime(), &file_for(vec![message], vec![]))
                .unwrap();
        assert!(rendered.contains("  bytes when = 4; // Unknown type: System.DateTime\n"));
    }

    #[test]
    fn test_render_enum_orders_zero_first() {
        let mut registry = TypeRegistry::new();
        let color = registry.add_enum(EnumType {
            full_name: "App.PhoneKind".to_string(),
            name: "PhoneKind".to_string(),
            namespace: "App".to_string(),
            root: None,
            pairs: vec![
                ("Work".to_string(), 2),
                ("Unknown".to_string(), 0),
                ("Home".to_string(), 1),
            ],
        });

        let rendered =
            render_file(&registry, &runtime(), &file_for(vec![], vec![color])).unwrap();
        assert_eq!(
            rendered,
            "syntax = \"proto3\";\n\
             package app;\n\
             option csharp_namespace = \"App\";\n\
             \n\
             enum PhoneKind {\n\
             \x20 PHONE_KIND_UNKNOWN = 0;\n\
             \x20 PHONE_KIND_HOME = 1;\n\
             \x20 PHONE_KIND_WORK = 2;\n\
             }\n"
        );
    }

    #[test]
    fn test_render_oneof_and_nested_types() {
        let mut registry = TypeRegistry::new();

        let discriminator = registry.add_enum(EnumType {
            full_name: "App.Event/PayloadOneofCase".to_string(),
            name: "PayloadOneofCase".to_string(),
            namespace: "App".to_string(),
            root: None,
            pairs: vec![
                ("None".to_string(), 0),
                ("Text".to_string(), 1),
                ("Count".to_string(), 2),
            ],
        });

        let mut event = MessageType::new("App.Event", "Event", "App", None);
        event.oneofs.push(Oneof {
            name: "Payload".to_string(),
            discriminator,
            members: vec![
                Field {
                    name: "Text".to_string(),
                    number: 1,
                    value_type: TypeRef::named("System.String"),
                    is_oneof_member: true,
                    has_presence: false,
                },
                Field {
                    name: "Count".to_string(),
                    number: 2,
                    value_type: TypeRef::named("System.Int32"),
                    is_oneof_member: true,
                    has_presence: false,
                },
            ],
        });
        let event = registry.add_message(event);

        let mut inner = MessageType::new("App.Event/Detail", "Detail", "App", Some(event));
        inner.fields.push(field("Note", 1, "System.String"));
        let inner = registry.add_message(inner);
        registry.message_mut(event).nested_messages.push(inner);

        let rendered =
            render_file(&registry, &runtime(), &file_for(vec![event], vec![])).unwrap();
        assert_eq!(
            rendered,
            "syntax = \"proto3\";\n\
             package app;\n\
             option csharp_namespace = \"App\";\n\
             \n\
             message Event {\n\
             \x20 oneof payload {\n\
             \x20   string text = 1;\n\
             \x20   int32 count = 2;\n\
             \x20 }\n\
             \n\
             \x20 message Detail {\n\
             \x20   string note = 1;\n\
             \x20 }\n\
             }\n"
        );
    }
}
