use abtesting::{ClientConfig, FetchAllRequest, FetchError, FetchRequest, TriggerEvent, UserIdentity};

pub fn main() {
    env_logger::init();

    let api_url = std::env::var("ABTESTING_API_URL").unwrap();
    let client = ClientConfig::from_api_url(api_url)
        .analytics_tracker(|event: &TriggerEvent| {
            println!("Trigger: {}", serde_json::to_string(event).unwrap());
        })
        .to_client()
        .unwrap();

    let user = UserIdentity::login("test-user");

    // Get assignment for test-user, falling back to the default on errors.
    let assignment = client
        .fetch_cache_first(&user, &FetchRequest::new("btn_type", "grey"))
        .unwrap_or_else(FetchError::into_fallback);
    println!("btn_type: {:?}", assignment.value);

    // Fetch every parameter at once and pass the result to another service.
    let all = client
        .fetch_all_assignments(&user, &FetchAllRequest::new())
        .unwrap_or_else(FetchError::into_fallback);
    let dump = all.dump().unwrap();

    match client.load_all_assignments(&user, &dump, true) {
        Ok(restored) => println!("page_size: {:?}", restored.value("page_size", 10)),
        Err(err) => println!("failed to load assignments: {err}"),
    }
}
