// src/builtin.rs
//
// Built-in synthetic target catalog.
//
// Each `TargetProfile` is expanded into a full scenario record by a
// ChaCha8 RNG seeded from the FNV-1a hash of the profile id, so the catalog
// is byte-identical on every machine. All nine outcome tables are derived
// from one "ground truth" item list per stage by taking mode-dependent
// prefixes, which makes every table monotone in mode intensity by
// construction.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::catalog::{CatalogError, ScenarioCatalog, Split};
use crate::scenario::{
    ports, Classification, Complexity, EndpointRecord, ExpectedTotals, OutcomeRecord, Scenario,
    ScenarioRecord, ServiceRecord, SubdomainRecord,
};
use crate::types::{Mode, Stage};

/// Static description of one synthetic target.
#[derive(Debug, Clone, Copy)]
pub struct TargetProfile<'a> {
    pub id: &'a str,
    pub label: &'a str,
    pub description: &'a str,
    pub domain: &'a str,
    pub complexity: Complexity,
    pub subdomains: usize,
    pub ports: &'a [u16],
    pub technologies: &'a [&'a str],
    pub split: Split,
}

macro_rules! profile {
    ($id:expr, $label:expr, $desc:expr, $domain:expr, $cx:ident, $subs:expr, $ports:expr, $tech:expr, $split:ident) => {
        TargetProfile {
            id: $id,
            label: $label,
            description: $desc,
            domain: $domain,
            complexity: Complexity::$cx,
            subdomains: $subs,
            ports: $ports,
            technologies: $tech,
            split: Split::$split,
        }
    };
}

/// The built-in target set: 20 training and 5 held-out targets.
pub const PROFILES: &[TargetProfile<'static>] = &[
    profile!("web_startup", "Modern Web Startup", "SaaS startup with microservices on standard web ports",
        "startup.example.com", Medium, 18, &[80, 443, 3000, 8080],
        &["React", "Node.js", "Express.js", "Nginx", "Docker"], Train),
    profile!("cdn_ecommerce", "CDN-Heavy E-commerce", "Storefront fronted entirely by a CDN",
        "shop.example.com", Low, 12, &[443],
        &["Cloudflare", "WordPress", "WooCommerce", "Nginx"], Test),
    profile!("api_gateway", "API Gateway Architecture", "Public API behind a gateway",
        "api.example.com", Medium, 15, &[443, 8080],
        &["Kong", "Express.js", "GraphQL", "Node.js", "Docker"], Train),
    profile!("load_balanced", "Load Balanced Web Farm", "Web farm behind HAProxy",
        "web.example.com", High, 22, &[80, 443, 8080, 8443],
        &["HAProxy", "Apache", "Nginx", "PHP", "Laravel"], Train),
    profile!("dev_web", "Development Web Environment", "Dev servers on alternate ports",
        "dev.example.com", Medium, 16, &[3000, 8080, 8081],
        &["Vite", "Webpack", "Express.js", "React", "Vue.js"], Train),
    profile!("database_cluster", "Database Server Cluster", "Exposed relational and NoSQL stores",
        "db.example.com", VeryHigh, 8, &[80, 443, 3306, 5432, 6379, 27017],
        &["MySQL", "PostgreSQL", "Redis", "MongoDB", "phpMyAdmin"], Train),
    profile!("mail_server", "Mail Server Infrastructure", "SMTP/IMAP/POP3 mail stack",
        "mail.example.com", High, 6, &[25, 143, 587, 993, 995],
        &["Postfix", "Dovecot", "SpamAssassin", "ClamAV"], Train),
    profile!("ssh_infra", "SSH Infrastructure", "Web front with SSH and data stores reachable",
        "infra.example.com", High, 10, &[22, 80, 443, 3306, 6379],
        &["OpenSSH", "MySQL", "Redis", "Ubuntu", "Nginx"], Train),
    profile!("enterprise_windows", "Enterprise Windows Domain", "Windows domain with SMB, MSSQL and RDP",
        "corp.example.com", VeryHigh, 12, &[80, 443, 445, 1433, 3389],
        &["Windows Server", "Active Directory", "MSSQL", "IIS"], Test),
    profile!("dev_infra", "Development Infrastructure", "CI server, database and SSH",
        "dev-infra.example.com", High, 14, &[22, 80, 443, 5432, 8080, 9000],
        &["Jenkins", "PostgreSQL", "Docker", "GitLab", "Nginx"], Train),
    profile!("admin_infra", "Admin Panel Infrastructure", "Admin consoles on alternate ports",
        "admin.example.com", High, 9, &[80, 443, 8080, 8443, 9090],
        &["Tomcat", "cPanel", "Webmin", "phpMyAdmin", "Apache"], Train),
    profile!("monitoring", "Monitoring Stack", "Metrics, dashboards and search cluster",
        "monitor.example.com", VeryHigh, 11, &[80, 443, 3000, 9090, 9093, 9200, 5601],
        &["Prometheus", "Grafana", "Elasticsearch", "Kibana", "Alertmanager"], Train),
    profile!("full_stack", "Full Stack Infrastructure", "Everything exposed on one estate",
        "full.example.com", VeryHigh, 20, &[22, 80, 443, 3306, 5432, 6379, 8080, 9000],
        &["MySQL", "PostgreSQL", "Redis", "Jenkins", "Nginx"], Train),
    profile!("web_monitoring", "Web + Monitoring", "Web app with a Prometheus endpoint",
        "webapp-mon.example.com", Medium, 13, &[80, 443, 9090],
        &["React", "Express.js", "Prometheus", "Nginx"], Train),
    profile!("web_database", "Web + Database", "Web app with its database exposed",
        "webapp-db.example.com", High, 11, &[80, 443, 3306],
        &["PHP", "Laravel", "MySQL", "Apache"], Train),
    profile!("web_ssh", "Web + SSH", "Web app with SSH reachable",
        "webapp-ssh.example.com", Medium, 14, &[22, 80, 443],
        &["Nginx", "Django", "OpenSSH", "Python"], Train),
    profile!("web_redis", "Web + Redis Cache", "Web app with an exposed cache",
        "webapp-cache.example.com", Medium, 12, &[80, 443, 6379],
        &["Node.js", "Redis", "React", "Express.js"], Test),
    profile!("web_backends", "Web + Multiple Backend Services", "Web app with several backend ports",
        "webapp-micro.example.com", High, 17, &[80, 443, 5000, 8080, 9000],
        &["React", "Flask", "Go", "Node.js", "Docker"], Train),
    profile!("web_admin", "Web + Admin Panel", "Web app with an HTTPS admin console",
        "webapp-admin.example.com", Medium, 10, &[80, 443, 8443],
        &["WordPress", "Admin Panel", "Nginx", "PHP"], Train),
    profile!("web_mail", "Web + Mail Services", "Corporate site with outbound mail",
        "webapp-mail.example.com", High, 9, &[25, 80, 443, 587],
        &["Corporate Site", "Postfix", "Nginx", "WordPress"], Test),
    profile!("custom_ports", "Custom Application Ports", "Custom applications on non-standard ports",
        "custom.example.com", Medium, 8, &[4000, 5000, 6000, 8888, 9999],
        &["Custom", "Go", "Rust", "Node.js"], Train),
    profile!("pure_backend", "Pure Backend Infrastructure", "No web surface, only backend services",
        "backend.example.com", High, 5, &[22, 3306, 5432],
        &["MySQL", "PostgreSQL", "OpenSSH"], Train),
    profile!("single_many", "Single Subdomain, Many Ports", "One host exposing a full stack",
        "server.example.com", VeryHigh, 1, &[22, 80, 443, 3306, 5432, 6379, 8080, 9000],
        &["MySQL", "PostgreSQL", "Redis", "Jenkins", "Nginx"], Train),
    profile!("many_nonstandard", "Many Subdomains, Non-Standard Ports", "Microservices on custom ports",
        "micro.example.com", High, 25, &[8081, 8082, 8083, 8084, 8085],
        &["Docker", "Kubernetes", "Go"], Train),
    profile!("mixed_custom", "Mixed Custom Infrastructure", "Web front plus unusual service ports",
        "mixed.example.com", VeryHigh, 15, &[80, 443, 4567, 5678, 9876],
        &["Custom", "Node.js", "Python", "Nginx"], Test),
];

/// Fraction of ground-truth subdomains found per discovery mode.
const DISCOVERY_RATIO: [f64; 3] = [0.5, 0.8, 1.0];
/// Fraction of live endpoints found per probing mode.
const PROBING_RATIO: [f64; 3] = [0.85, 0.93, 1.0];
/// Fraction of each endpoint's technology stack fingerprinted per probing mode.
const TECH_DETAIL_RATIO: [f64; 3] = [0.5, 0.8, 1.0];
/// Fraction of open ports found per port-analysis mode.
const PORT_RATIO: [f64; 3] = [0.6, 0.9, 1.0];
/// Elapsed-time multipliers per mode, by stage.
const TIME_FACTOR: [[f64; 3]; 3] = [[0.3, 0.6, 1.0], [0.4, 0.7, 1.0], [0.3, 0.6, 1.0]];

const HIGH_VALUE_PREFIXES: &[&str] = &[
    "api", "admin", "panel", "manage", "auth", "login", "dashboard", "payment", "checkout", "db",
    "database", "mysql", "postgres", "redis", "mongo", "vpn", "backup", "ssh",
];

fn prefix_pool(class: Classification) -> &'static [&'static str] {
    match class {
        Classification::WebOnly => &[
            "www", "api", "app", "dev", "staging", "prod", "web", "portal", "dashboard", "cdn",
            "static", "assets", "media", "blog", "shop", "store", "checkout", "payment", "auth",
            "login", "admin", "panel", "manage",
        ],
        Classification::Infrastructure => &[
            "db", "database", "mysql", "postgres", "redis", "mongo", "cache", "mail", "smtp",
            "imap", "pop3", "webmail", "ssh", "vpn", "backup", "ftp", "sftp", "monitoring", "logs",
            "metrics",
        ],
        Classification::Hybrid => &[
            "www", "api", "app", "db", "cache", "admin", "staging", "dev", "monitoring", "mail",
            "dashboard", "portal",
        ],
        Classification::Edge => &["custom", "service", "node", "cluster", "worker", "task", "job"],
    }
}

/// nmap-style service name for a port.
fn service_name(port: u16) -> &'static str {
    match port {
        22 => "ssh",
        25 | 587 => "smtp",
        80 => "http",
        143 => "imap",
        443 => "https",
        445 => "microsoft-ds",
        993 => "imaps",
        995 => "pop3s",
        1433 => "ms-sql-s",
        3306 => "mysql",
        3389 => "ms-wbt-server",
        5432 => "postgresql",
        6379 => "redis",
        8080 => "http-proxy",
        8443 => "https-alt",
        9000 => "http",
        9090 => "http",
        9200 => "elasticsearch",
        27017 => "mongod",
        3000 | 5000 | 8081..=8085 => "http-alt",
        _ => "unknown",
    }
}

/// Candidate detected versions for a port's service.
fn service_versions(port: u16) -> &'static [&'static str] {
    match port {
        22 => &["OpenSSH 8.9p1", "OpenSSH 8.4p1", "OpenSSH 8.2p1"],
        25 | 587 => &["Postfix 3.7.2", "Postfix 3.6.7", "Postfix 3.5.13"],
        80 => &["nginx 1.24.0", "nginx 1.22.1", "Apache 2.4.56"],
        143 => &["Dovecot 2.3.19", "Dovecot 2.3.16"],
        443 => &["nginx 1.24.0", "nginx 1.22.1", "Apache 2.4.56"],
        445 => &["Windows Server 2019 SMB", "Windows Server 2016 SMB"],
        993 => &["Dovecot 2.3.19", "Dovecot 2.3.13"],
        995 => &["Dovecot 2.3.19", "Dovecot 2.3.13"],
        1433 => &["MSSQL 2019 RTM", "MSSQL 2017 CU31"],
        3306 => &["MySQL 8.0.33", "MySQL 8.0.32", "MySQL 5.7.42"],
        3389 => &["Microsoft Terminal Services"],
        5432 => &["PostgreSQL 15.2", "PostgreSQL 14.5", "PostgreSQL 13.10"],
        6379 => &["Redis 7.0.8", "Redis 6.2.11", "Redis 6.0.16"],
        8080 => &["nginx 1.24.0", "Tomcat 9.0.70"],
        8443 => &["nginx 1.24.0"],
        9000 => &["Jenkins 2.387.1", "Jenkins 2.375.3"],
        9090 => &["Prometheus 2.40.7", "Prometheus 2.38.0"],
        9200 => &["Elasticsearch 8.6.2", "Elasticsearch 7.17.9"],
        27017 => &["MongoDB 6.0.4", "MongoDB 5.0.15"],
        _ => &[],
    }
}

/// 64-bit FNV-1a hash, used to derive per-target RNG seeds.
pub fn fnv1a64(s: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut h = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

fn take(n: usize, ratio: f64) -> usize {
    ((n as f64 * ratio).ceil() as usize).min(n)
}

fn secs(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn is_high_value_host(name: &str) -> bool {
    let label = name.split('.').next().unwrap_or("");
    let prefix = label.trim_end_matches(|c: char| c.is_ascii_digit());
    HIGH_VALUE_PREFIXES.contains(&prefix)
}

fn generate_subdomains(
    rng: &mut ChaCha8Rng,
    profile: &TargetProfile<'_>,
    class: Classification,
) -> Vec<String> {
    let pool = prefix_pool(class);
    let mut prefixes: Vec<&str> = pool.to_vec();
    prefixes.shuffle(rng);

    let mut names: Vec<String> = prefixes
        .iter()
        .take(profile.subdomains)
        .map(|p| format!("{p}.{}", profile.domain))
        .collect();
    let mut suffix = 1;
    while names.len() < profile.subdomains {
        let prefix = pool[rng.gen_range(0..pool.len())];
        names.push(format!("{prefix}{suffix}.{}", profile.domain));
        suffix += 1;
    }
    // discovery order
    names.shuffle(rng);
    names
}

/// Expand one profile into a complete, valid scenario record.
pub fn generate_record(profile: &TargetProfile<'_>) -> ScenarioRecord {
    let mut rng = ChaCha8Rng::seed_from_u64(fnv1a64(profile.id));
    let class = Classification::derive(profile.ports);

    let mut port_list = profile.ports.to_vec();
    port_list.sort_unstable();
    let http_ports: Vec<u16> = port_list.iter().copied().filter(|p| !ports::is_infra(*p)).collect();

    // ground truth: subdomains
    let subdomains = generate_subdomains(&mut rng, profile, class);

    // ground truth: live endpoints, ports assigned round-robin so that every
    // HTTP-capable port is covered by the first endpoints in list order
    let live_count = if http_ports.is_empty() {
        0
    } else {
        let ratio = rng.gen_range(0.7..0.9);
        let n = subdomains.len();
        ((n as f64 * ratio).round() as usize).clamp(http_ports.len().min(n), n)
    };
    let mut live_hosts: Vec<String> = subdomains.clone();
    live_hosts.shuffle(&mut rng);
    live_hosts.truncate(live_count);
    live_hosts.sort();

    let endpoints: Vec<EndpointRecord> = live_hosts
        .iter()
        .enumerate()
        .map(|(i, host)| {
            let port = http_ports[i % http_ports.len()];
            let scheme = if port == 443 || port == 8443 { "https" } else { "http" };
            let m = profile.technologies.len().min(3);
            let technologies = profile
                .technologies
                .choose_multiple(&mut rng, m)
                .map(|t| t.to_string())
                .collect();
            EndpointRecord {
                url: format!("{scheme}://{host}:{port}"),
                port,
                high_value: is_high_value_host(host) || ports::is_admin(port),
                technologies,
            }
        })
        .collect();

    // ground truth: services with versions, ascending port order
    let services: Vec<ServiceRecord> = port_list
        .iter()
        .map(|port| {
            let version = service_versions(*port)
                .choose(&mut rng)
                .map(|v| v.to_string());
            ServiceRecord {
                port: *port,
                service: service_name(*port).to_string(),
                version,
            }
        })
        .collect();

    // base stage times before mode scaling
    let jitter = |rng: &mut ChaCha8Rng| rng.gen_range(0.9..1.1);
    let base = [
        (20.0 + 1.5 * subdomains.len() as f64) * jitter(&mut rng),
        (15.0 + 2.0 * endpoints.len() as f64) * jitter(&mut rng),
        (40.0 + 12.0 * port_list.len() as f64) * jitter(&mut rng),
    ];

    let mut outcomes = Vec::with_capacity(9);
    for mode in Mode::ALL {
        let m = mode.index();

        let n = take(subdomains.len(), DISCOVERY_RATIO[m]).max(subdomains.len().min(1));
        outcomes.push(OutcomeRecord {
            stage: Stage::Discovery,
            mode: Stage::Discovery.mode_name(mode).to_string(),
            elapsed_secs: secs(base[0] * TIME_FACTOR[0][m]),
            subdomains: subdomains[..n]
                .iter()
                .map(|name| SubdomainRecord {
                    name: name.clone(),
                    high_value: is_high_value_host(name),
                })
                .collect(),
            endpoints: Vec::new(),
            services: Vec::new(),
        });
    }

    let mut probed_prev = 0;
    for mode in Mode::ALL {
        let m = mode.index();
        let e = endpoints.len();
        let n = take(e, PROBING_RATIO[m])
            .max(http_ports.len().min(e))
            .max(probed_prev);
        probed_prev = n;
        outcomes.push(OutcomeRecord {
            stage: Stage::Probing,
            mode: Stage::Probing.mode_name(mode).to_string(),
            elapsed_secs: secs(base[1] * TIME_FACTOR[1][m]),
            subdomains: Vec::new(),
            endpoints: endpoints[..n]
                .iter()
                .map(|ep| EndpointRecord {
                    technologies: ep.technologies
                        [..take(ep.technologies.len(), TECH_DETAIL_RATIO[m])]
                        .to_vec(),
                    ..ep.clone()
                })
                .collect(),
            services: Vec::new(),
        });
    }

    for mode in Mode::ALL {
        let m = mode.index();
        let n = take(services.len(), PORT_RATIO[m]).max(1);
        let found = &services[..n];
        let versioned: Vec<u16> = found
            .iter()
            .filter(|s| s.version.is_some())
            .map(|s| s.port)
            .collect();
        let keep_versions = match mode {
            Mode::Fast => 0,
            Mode::Standard => versioned.len().div_ceil(2),
            Mode::Thorough => versioned.len(),
        };
        let kept = &versioned[..keep_versions];
        outcomes.push(OutcomeRecord {
            stage: Stage::PortAnalysis,
            mode: Stage::PortAnalysis.mode_name(mode).to_string(),
            elapsed_secs: secs(base[2] * TIME_FACTOR[2][m]),
            subdomains: Vec::new(),
            endpoints: Vec::new(),
            services: found
                .iter()
                .map(|s| ServiceRecord {
                    version: if kept.contains(&s.port) {
                        s.version.clone()
                    } else {
                        None
                    },
                    ..s.clone()
                })
                .collect(),
        });
    }

    let infra = port_list.iter().filter(|p| ports::is_infra(**p)).count() as u32;
    ScenarioRecord {
        id: profile.id.to_string(),
        label: profile.label.to_string(),
        description: profile.description.to_string(),
        complexity: profile.complexity,
        expected: ExpectedTotals {
            subdomains: subdomains.len() as u32,
            live_endpoints: endpoints.len() as u32,
            open_ports: port_list.len() as u32,
            critical_services: infra,
        },
        ports: port_list,
        outcomes,
    }
}

/// Build the validated built-in catalog (both splits).
pub fn builtin_catalog() -> Result<ScenarioCatalog, CatalogError> {
    let mut catalog = ScenarioCatalog::new();
    for profile in PROFILES {
        let scenario = Scenario::from_record(generate_record(profile))?;
        catalog.insert(profile.split, scenario)?;
    }
    Ok(catalog)
}
