use super::{finish, resolve_key, Report, Session};
use rekon_core::{delete, delete_if_present, Chain};
use rekon_store::{DeleteOptions, PropagationPolicy};

pub fn run(
    session: &Session,
    type_spec: &str,
    key: &str,
    namespace: &str,
    propagation: Option<&str>,
    if_present: bool,
    json: bool,
) -> Result<u8, String> {
    let rt = session.resolve_type(type_spec)?;
    let key = resolve_key(&rt, key, namespace)?;
    let mut options = DeleteOptions::new();
    if let Some(policy) = propagation {
        options = options.with_propagation(
            policy
                .parse::<PropagationPolicy>()
                .map_err(|e| e.to_string())?,
        );
    }

    let action = if if_present {
        delete_if_present(&rt, &key, options)
    } else {
        delete(&rt, &key, options)
    };
    let directive = session.reconciler.run(&key, &Chain::new().then(action));
    finish(&directive, &Report::new(&directive), json)
}
