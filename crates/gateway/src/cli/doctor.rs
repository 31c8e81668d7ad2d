use ra_domain::config::{Config, ConfigSeverity};
use ra_providers::ProviderRegistry;

/// Run all diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("ra-gateway doctor");
    println!("=================\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_llm_providers(config, &mut all_passed);

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists { config_path.to_owned() } else { format!("{config_path} not found (using defaults)") },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count();
    print_check(
        "Config validates",
        error_count == 0,
        if issues.is_empty() { "no issues".to_owned() } else { format!("{} issue(s), see `config validate`", issues.len()) },
    );
    if error_count > 0 {
        *all_passed = false;
    }
}

fn check_llm_providers(config: &Config, all_passed: &mut bool) {
    match ProviderRegistry::from_config(&config.llm) {
        Ok(registry) => {
            let ok = !registry.is_empty();
            print_check(
                "LLM providers initialized",
                ok,
                if ok { registry.list_providers().join(", ") } else { "no providers configured".to_owned() },
            );
            if !ok {
                *all_passed = false;
            }
        }
        Err(e) => {
            print_check("LLM providers initialized", false, e.to_string());
            *all_passed = false;
        }
    }
}

fn print_check(name: &str, passed: bool, detail: String) {
    let mark = if passed { "OK" } else { "FAIL" };
    println!("[{mark}] {name}: {detail}");
}
