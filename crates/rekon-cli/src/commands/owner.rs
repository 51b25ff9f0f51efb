use super::{exit_code, finish, json_pretty, resolve_key, Report, Session};
use rekon_core::{get, Chain, Directive};
use rekon_schema::{OwnerReference, Resource};

fn describe(reference: Option<&OwnerReference>) -> String {
    reference.map_or_else(|| "none".to_owned(), |r| format!("{} {}", r.kind, r.name))
}

/// Show the controller of an object and the controller one level above it,
/// or the topmost controller with `root`.
pub fn run(
    session: &Session,
    type_spec: &str,
    key: &str,
    namespace: &str,
    root: bool,
    json: bool,
) -> Result<u8, String> {
    let rt = session.resolve_type(type_spec)?;
    let key = resolve_key(&rt, key, namespace)?;
    let (directive, report) = session.run_reading(&key, &Chain::new().then(get(&rt, &key)));
    let Some(obj) = report.object.clone() else {
        return finish(&directive, &report, json);
    };

    let found = if root {
        session.reconciler.root_owner(&obj)
    } else {
        session.reconciler.find_owner(&obj)
    };
    let owner = match found {
        Ok(owner) => owner,
        Err(e) => {
            let failed = Directive::failed(&key, e);
            return finish(&failed, &Report::new(&failed), json);
        }
    };
    let label = if root { "root" } else { "owner" };

    if json {
        let value = serde_json::json!({
            "object": key.to_string(),
            "controller": obj.controller(),
            label: owner,
        });
        println!("{}", json_pretty(&value)?);
    } else {
        println!("controller: {}", describe(obj.controller()));
        println!("{label}: {}", describe(owner.as_ref()));
    }
    Ok(exit_code(&directive))
}
