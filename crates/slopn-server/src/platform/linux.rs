//! Linux `iptables` NAT/forwarding install for `--nat`: shells out via
//! `std::process::Command`, synchronously, once, at boot.

use std::process::Command;

use ipnet::Ipv4Net;

use crate::error::Error;

fn run(cmd: &str, args: &[&str]) -> Result<(), Error> {
	let status = Command::new(cmd).args(args).status().map_err(|err| Error::Nat(format!("{cmd}: {err}")))?;
	if !status.success() {
		return Err(Error::Nat(format!("{cmd} {args:?} exited with {status}")));
	}
	Ok(())
}

/// Install MASQUERADE NAT for the tunnel subnet plus the matching `FORWARD`
/// ACCEPT rules, so tunneled clients can reach the internet through the
/// server's default route.
pub fn install_nat(subnet: Ipv4Net) -> Result<(), Error> {
	let cidr = subnet.to_string();
	run("iptables", &["-t", "nat", "-A", "POSTROUTING", "-s", &cidr, "-j", "MASQUERADE"])?;
	run("iptables", &["-A", "FORWARD", "-s", &cidr, "-j", "ACCEPT"])?;
	run("iptables", &["-A", "FORWARD", "-d", &cidr, "-m", "state", "--state", "ESTABLISHED,RELATED", "-j", "ACCEPT"])?;
	run("sysctl", &["-w", "net.ipv4.ip_forward=1"])?;
	Ok(())
}
