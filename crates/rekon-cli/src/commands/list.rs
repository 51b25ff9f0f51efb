use super::{exit_code, finish, Session};
use rekon_core::{list, Chain};
use rekon_schema::{ListFilter, ObjectKey, Resource};

pub fn run(
    session: &Session,
    type_spec: &str,
    namespace: Option<&str>,
    selector: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let rt = session.resolve_type(type_spec)?;
    let mut filter = match namespace {
        Some(ns) if rt.namespaced => ListFilter::in_namespace(ns),
        _ => ListFilter::all(),
    };
    if let Some(selector) = selector {
        filter.labels = ListFilter::parse_label_selector(selector).map_err(|e| e.to_string())?;
    }

    let target = match namespace {
        Some(ns) if rt.namespaced => ObjectKey::namespaced(ns, &rt.plural),
        _ => ObjectKey::cluster(&rt.plural),
    };
    let chain = Chain::new().then(list(&rt, filter));
    let (directive, report) = session.run_reading(&target, &chain);

    if !json {
        if let Some(items) = &report.items {
            if items.is_empty() {
                println!("No {} found.", rt.plural);
            } else {
                println!("{:<24} {:<32} VERSION", "NAMESPACE", "NAME");
                for obj in items {
                    let meta = obj.meta();
                    println!(
                        "{:<24} {:<32} {}",
                        meta.namespace.as_deref().unwrap_or("-"),
                        meta.name.as_str(),
                        meta.resource_version.as_deref().unwrap_or("-"),
                    );
                }
            }
            return Ok(exit_code(&directive));
        }
    }
    finish(&directive, &report, json)
}
