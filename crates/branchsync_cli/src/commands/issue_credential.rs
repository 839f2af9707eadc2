//! Credential issuance command implementation.

use branchsync_protocol::RecordId;
use branchsync_server::BranchCredentials;

/// Runs the issue-credential command.
pub fn run(branch: &str, secret: &str, secret_is_hex: bool) -> Result<(), Box<dyn std::error::Error>> {
    let branch_id: RecordId = branch.parse()?;
    let secret = if secret_is_hex {
        hex::decode(secret.trim())?
    } else {
        secret.as_bytes().to_vec()
    };
    if secret.is_empty() {
        return Err("Credential secret must not be empty".into());
    }

    let token = BranchCredentials::new(secret).issue(branch_id)?;
    println!("{token}");
    Ok(())
}
