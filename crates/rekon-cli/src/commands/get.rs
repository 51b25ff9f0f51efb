use super::{exit_code, finish, print_object, resolve_key, Session};
use rekon_core::{get, Chain, Directive};

pub fn run(
    session: &Session,
    type_spec: &str,
    key: &str,
    namespace: &str,
    json: bool,
) -> Result<u8, String> {
    let rt = session.resolve_type(type_spec)?;
    let key = resolve_key(&rt, key, namespace)?;
    let chain = Chain::new().then(get(&rt, &key));
    let (directive, report) = session.run_reading(&key, &chain);

    if !json {
        if let Some(obj) = &report.object {
            print_object(obj)?;
            return Ok(exit_code(&directive));
        }
        if matches!(directive, Directive::Stop(_)) {
            eprintln!("{} '{key}' not found", rt.kind);
        }
    }
    finish(&directive, &report, json)
}
