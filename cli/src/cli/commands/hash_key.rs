use bearer_relay_core::origin::hash_api_key;

pub fn run(key: &str) {
    println!("{}", hash_api_key(key));
}
