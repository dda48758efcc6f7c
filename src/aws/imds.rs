use anyhow::{Result, anyhow};
use tokio::runtime::Handle;

#[derive(Clone, Debug)]
pub struct ImdsClient {
    rt: Handle,
    client: ImdsClientAsync,
}

impl ImdsClient {
    pub fn new(rt: Handle, client: aws_config::imds::Client) -> Self {
        let client_async = ImdsClientAsync::new(client);
        Self {
            rt,
            client: client_async,
        }
    }

    pub fn get_metadata(&self, path: &str) -> Result<String> {
        self.rt.block_on(self.client.get_metadata(path))
    }

    pub fn list_metadata(&self, path: &str) -> Result<Vec<String>> {
        self.rt.block_on(self.client.list_metadata(path))
    }
}

#[derive(Clone, Debug)]
pub struct ImdsClientAsync {
    client: aws_config::imds::Client,
}

impl ImdsClientAsync {
    pub fn new(client: aws_config::imds::Client) -> Self {
        Self { client }
    }

    pub async fn get_metadata(&self, path: &str) -> Result<String> {
        let full_path = format!("/latest/meta-data/{}", path);
        self.client
            .get(&full_path)
            .await
            .map(Into::into)
            .map_err(|e| anyhow!("failed to get {} from IMDS: {}", &full_path, e))
    }

    // Directory listings are newline separated, subdirectories end in a slash.
    pub async fn list_metadata(&self, path: &str) -> Result<Vec<String>> {
        let listing = self.get_metadata(path).await?;
        Ok(split_listing(&listing))
    }
}

pub(crate) fn split_listing(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
