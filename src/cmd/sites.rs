use vnlink::Config;

pub fn cmd_sites(config: &Config) {
    for profile in config.registry.iter() {
        println!("{:<14} {:<16} {}", profile.id, profile.name, profile.base_url);
    }
}
