//! Operator-facing post-install report.

use std::net::IpAddr;

use crate::certs;
use crate::config::ProvisionConfig;

/// Render the next-steps report. Pure: nothing on the host changes.
pub fn render(config: &ProvisionConfig, ip: IpAddr) -> String {
    let fqdn = config.fqdn();
    let domain = &config.domain;
    let a_type = if ip.is_ipv6() { "AAAA" } else { "A" };
    let ip_mech = if ip.is_ipv6() { "ip6" } else { "ip4" };
    let mail_root = config.paths.mail_root.display();
    let user = &config.service_user;

    let mut out = String::new();
    out.push_str("Mail server provisioning complete.\n\n");
    out.push_str(&format!("  Hostname: {fqdn}\n"));
    out.push_str(&format!("  Domain:   {domain}\n"));
    out.push_str(&format!("  IP:       {ip}\n\n"));

    out.push_str("Next steps:\n\n");
    out.push_str("  1. DNS records at your registrar:\n");
    out.push_str(&format!("       {fqdn}.    IN {a_type}   {ip}\n"));
    out.push_str(&format!("       {domain}.    IN MX  10 {fqdn}.\n"));
    out.push_str(&format!(
        "  2. SPF:\n       {domain}.    IN TXT \"v=spf1 mx {ip_mech}:{ip} -all\"\n"
    ));
    out.push_str(&format!(
        "  3. DKIM: generate a key, then publish the TXT record it prints:\n       su - {user} -c \"{mail_root}/libexec/zmdkimkeyutil -a -d {domain}\"\n"
    ));
    out.push_str(&format!(
        "  4. DMARC:\n       _dmarc.{domain}.    IN TXT \"v=DMARC1; p=quarantine; rua=mailto:{}\"\n",
        config.contact_email
    ));
    out.push_str(&format!(
        "  5. Ask your provider for a PTR record: {ip} -> {fqdn}\n"
    ));
    out.push_str(&format!(
        "  6. Admin console: https://{fqdn}:7071\n"
    ));
    out.push_str(&format!(
        "  7. Certificate renewal (root crontab), redeploying after each renewal:\n       0 3 * * 1 certbot renew --quiet --standalone --pre-hook \"su - {user} -c '{mail_root}/bin/zmproxyctl stop'\" --post-hook \"su - {user} -c '{mail_root}/bin/zmproxyctl start'\" --deploy-hook \"{}\"\n",
        certs::renewal_deploy_hook(config)
    ));
    out
}
