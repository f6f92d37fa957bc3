use agency_sync::BindingKey;
use colored::Colorize;

pub fn header(title: &str) {
    println!("{}", title.bold().underline());
}

pub fn subheader(title: &str) {
    println!("{}", title.bold());
}

pub fn hint(msg: &str) {
    println!("{} {}", "hint:".cyan().bold(), msg.dimmed());
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

pub fn removal(key: &BindingKey) {
    println!("  {} {} {}", "-".red().bold(), key.role.red(), format!("@ {}", key.scope).dimmed());
}

pub fn addition(key: &BindingKey) {
    println!("  {} {} {}", "+".green().bold(), key.role.green(), format!("@ {}", key.scope).dimmed());
}

pub fn field(label: &str, value: &str) {
    println!("  {} {}", format!("{}:", label).dimmed(), value.cyan());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_lines_do_not_panic() {
        let key = BindingKey::new("proj-a", "Admin").unwrap();
        removal(&key);
        addition(&key);
    }

    #[test]
    fn test_plain_lines_do_not_panic() {
        header("Header");
        subheader("Subheader");
        hint("hint");
        warn("warning");
        success("done");
        field("Agency", "a-1");
    }
}
