//! # CRD Generator
//!
//! Prints the YAML of every custom resource definition served by the
//! operator, separated as a multi-document stream.
//!
//! ```bash
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use anyhow::Result;
use jenkins_operator::crd::all_crds;

fn main() -> Result<()> {
    for crd in all_crds() {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
