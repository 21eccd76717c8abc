use std::{fs::File, io::BufReader};

pub fn main() {
    env_logger::init();

    let server_url = std::env::var("DHIS2_SERVER_URL").unwrap();
    let username = std::env::var("DHIS2_USERNAME").unwrap();
    let password = std::env::var("DHIS2_PASSWORD").unwrap();

    let mut settings = dhis2_events::ConnectionSettings::new(server_url, username, password);
    settings.request_logger(|entry: dhis2_events::RequestLogEntry| {
        println!("{} {} -> {:?}", entry.method, entry.url, entry.response_status);
    });
    let client = settings.to_client();

    let configs = dhis2_events::read_form_configs("tests/data/form_configs.json").unwrap();
    let form: serde_json::Value =
        serde_json::from_reader(BufReader::new(File::open("tests/data/visit_form.json").unwrap()))
            .unwrap();

    for (config, result) in client.send_form("sample-domain", &configs, &form) {
        println!("{}: {:?}", config.program_id, result);
    }
}
