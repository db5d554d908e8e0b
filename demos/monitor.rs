use hidclient::logger::LoggingListener;
use hidclient::{ClientConfig, DeviceIdentity, EventFilter, HidClient, HidConnection};
use tracing_subscriber::EnvFilter;

struct Monitor {
    identity: DeviceIdentity,
}

impl HidClient for Monitor {
    fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    fn on_connect(&self) {
        println!("{} connected", self.identity);
    }

    fn on_report(&self, report: Vec<u8>) {
        let hex: Vec<String> = report.iter().map(|b| format!("{b:02x}")).collect();
        println!("{}", hex.join(" "));
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "hidclient.toml".to_string());
    let config = ClientConfig::load(&path).expect("load config");

    let client = Monitor {
        identity: config.identity(),
    };
    let conn = HidConnection::builder(client)
        .config(&config)
        .build()
        .expect("start connection");
    conn.subscribe(
        LoggingListener::new(config.identity().to_string()),
        EventFilter::ConnectionOnly,
    );

    loop {
        if let Some(meta) = conn.device_meta() {
            println!("{}", serde_json::to_string_pretty(&meta).expect("serialize meta"));
        }
        std::thread::sleep(std::time::Duration::from_secs(5));
    }
}
