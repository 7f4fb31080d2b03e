//! WiFi station, SNTP and HTTP uploads over embassy-net
//!
//! The radio is only started for a sync or a provisioning request and is
//! stopped again before the node goes back to sleep.

use core::time::Duration;

use canopy::config::InternetConfig;
use canopy::http::Endpoint;
use canopy::net::{NetError, Network, Uploader};
use embassy_net::dns::{DnsQueryType, DnsSocket};
use embassy_net::tcp::client::{TcpClient, TcpClientState};
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, Stack};
use embassy_time::with_timeout;
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController};
use log::{debug, info, warn};
use reqwless::client::HttpClient;
use reqwless::request::{Method, RequestBuilder};

use crate::rtc::RtcClock;

const NTP_HOST: &str = "pool.ntp.org";
const NTP_PORT: u16 = 123;
const NTP_PACKET_LEN: usize = 48;
/// Seconds between the NTP era (1900) and the Unix epoch.
const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

fn embassy_duration(timeout: Duration) -> embassy_time::Duration {
    embassy_time::Duration::from_millis(timeout.as_millis() as u64)
}

async fn resolve(stack: Stack<'_>, host: &str) -> Result<IpAddress, NetError> {
    let addrs = stack.dns_query(host, DnsQueryType::A).await.map_err(|e| {
        warn!("DNS lookup of {} failed: {:?}", host, e);
        NetError::Dns
    })?;
    addrs.first().copied().ok_or(NetError::Dns)
}

/// Station-mode WiFi link with the compiled-in credentials.
pub struct WifiLink<'d> {
    controller: WifiController<'d>,
    stack: Stack<'d>,
    internet: InternetConfig<'d>,
    clock: RtcClock,
}

impl<'d> WifiLink<'d> {
    pub fn new(
        controller: WifiController<'d>,
        stack: Stack<'d>,
        internet: InternetConfig<'d>,
        clock: RtcClock,
    ) -> Self {
        Self {
            controller,
            stack,
            internet,
            clock,
        }
    }

    async fn associate(&mut self) -> Result<(), NetError> {
        if self.internet.ssid.is_empty() {
            return Err(NetError::NotProvisioned);
        }

        if !matches!(self.controller.is_started(), Ok(true)) {
            let mode = ModeConfig::Client(
                ClientConfig::default()
                    .with_ssid(self.internet.ssid.into())
                    .with_password(self.internet.password.into()),
            );
            self.controller.set_config(&mode).map_err(|e| {
                warn!("WiFi config rejected: {:?}", e);
                NetError::Connect
            })?;
            self.controller.start_async().await.map_err(|e| {
                warn!("WiFi start failed: {:?}", e);
                NetError::Connect
            })?;
        }

        self.controller.connect_async().await.map_err(|e| {
            warn!("WiFi association failed: {:?}", e);
            NetError::Connect
        })?;

        self.stack.wait_config_up().await;
        if let Some(config) = self.stack.config_v4() {
            info!("WiFi up, address {}", config.address);
        }
        Ok(())
    }

    async fn sntp_query(&mut self) -> Result<i64, NetError> {
        let server = resolve(self.stack, NTP_HOST).await?;

        let mut rx_meta = [PacketMetadata::EMPTY; 1];
        let mut tx_meta = [PacketMetadata::EMPTY; 1];
        let mut rx_buffer = [0u8; 128];
        let mut tx_buffer = [0u8; 128];
        let mut socket = UdpSocket::new(
            self.stack,
            &mut rx_meta,
            &mut rx_buffer,
            &mut tx_meta,
            &mut tx_buffer,
        );
        socket.bind(0).map_err(|_| NetError::Io)?;

        // LI 0, version 4, client mode.
        let mut packet = [0u8; NTP_PACKET_LEN];
        packet[0] = 0x23;
        socket
            .send_to(&packet, (server, NTP_PORT))
            .await
            .map_err(|_| NetError::Io)?;

        let (len, _) = socket
            .recv_from(&mut packet)
            .await
            .map_err(|_| NetError::Io)?;
        if len < NTP_PACKET_LEN {
            return Err(NetError::Io);
        }

        let secs = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]) as u64;
        let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]) as u64;
        let unix_secs = secs.checked_sub(NTP_UNIX_OFFSET_SECS).ok_or(NetError::Io)?;

        Ok((unix_secs * 1_000 + ((fraction * 1_000) >> 32)) as i64)
    }
}

impl Network for WifiLink<'_> {
    async fn connect(&mut self, timeout: Duration) -> Result<(), NetError> {
        info!("Connecting to {}", self.internet.ssid);
        with_timeout(embassy_duration(timeout), self.associate())
            .await
            .map_err(|_| NetError::Timeout)?
    }

    async fn acquire_absolute_time(&mut self, timeout: Duration) -> Result<(), NetError> {
        let unix_ms = with_timeout(embassy_duration(timeout), self.sntp_query())
            .await
            .map_err(|_| NetError::Timeout)??;

        self.clock.set_ms(unix_ms);
        info!("Wall clock set from SNTP: {} ms", unix_ms);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.controller.disconnect_async().await {
            debug!("WiFi disconnect: {:?}", e);
        }
        if let Err(e) = self.controller.stop_async().await {
            debug!("WiFi stop: {:?}", e);
        }
        info!("WiFi stopped");
    }

    /// The radio stack offers no over-the-air credential handover, so
    /// provisioning checks that the stored credentials associate.
    async fn provision(&mut self, timeout: Duration) -> Result<(), NetError> {
        self.connect(timeout).await
    }
}

/// HTTP client posting readout batches, one connection per batch.
pub struct HttpUploader<'d> {
    stack: Stack<'d>,
}

impl<'d> HttpUploader<'d> {
    pub fn new(stack: Stack<'d>) -> Self {
        Self { stack }
    }

    async fn exchange(&mut self, endpoint: &Endpoint, body: &[u8]) -> Result<u16, NetError> {
        let client_state = TcpClientState::<1, 1024, 2048>::new();
        let tcp_client = TcpClient::new(self.stack, &client_state);
        let dns_client = DnsSocket::new(self.stack);
        let mut http_client = HttpClient::new(&tcp_client, &dns_client);

        let url = endpoint.url();
        let request = http_client
            .request(Method::POST, &url)
            .await
            .map_err(|e| {
                warn!("Connect to {} failed: {:?}", url, e);
                http_error(e)
            })?;

        let headers = [("Content-Type", "application/json")];
        let mut request = request.headers(&headers).body(body);

        // Only the status matters; the buffer just has to hold the head.
        let mut rx_buffer = [0u8; 1024];
        let response = request.send(&mut rx_buffer).await.map_err(|e| {
            warn!("POST to {} failed: {:?}", url, e);
            http_error(e)
        })?;

        Ok(response.status.0)
    }
}

fn http_error(e: reqwless::Error) -> NetError {
    match e {
        reqwless::Error::Dns => NetError::Dns,
        reqwless::Error::Network(_) => NetError::Connect,
        _ => NetError::Io,
    }
}

impl Uploader for HttpUploader<'_> {
    async fn post(
        &mut self,
        endpoint: &Endpoint,
        body: &[u8],
        timeout: Duration,
    ) -> Result<u16, NetError> {
        with_timeout(embassy_duration(timeout), self.exchange(endpoint, body))
            .await
            .map_err(|_| NetError::Timeout)?
    }
}
