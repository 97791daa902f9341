use crate::error::StorageError;
use crate::storage_backend::{
    child_path, ByteStream, FileEntry, StorageClient, StorageResult, WriteOptions, OCTET_STREAM,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use url::Url;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:displayname/>
    <D:getcontentlength/>
    <D:getcontenttype/>
    <D:getlastmodified/>
    <D:resourcetype/>
  </D:prop>
</D:propfind>"#;

/// One `<D:response>` element of a multistatus body.
#[derive(Debug, Clone, Default, PartialEq)]
struct DavResource {
    href: String,
    is_collection: bool,
    size: Option<u64>,
    content_type: Option<String>,
    modified: Option<i64>,
}

/// Storage client speaking WebDAV to a remote server.
#[derive(Clone)]
pub struct WebDAVBackend {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl WebDAVBackend {
    pub fn new(
        base_url: String,
        username: Option<String>,
        password: Option<String>,
    ) -> StorageResult<Self> {
        let base_url = Url::parse(&base_url)
            .map_err(|e| StorageError::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let client = Client::builder().build()?;

        Ok(Self {
            client,
            base_url,
            username,
            password,
        })
    }

    fn build_url(&self, path: &str, collection: bool) -> StorageResult<Url> {
        let path = path.trim_start_matches('/');
        let mut full = self.base_url.path().trim_end_matches('/').to_string() + "/" + path;
        if collection && !full.ends_with('/') {
            full.push('/');
        }

        self.base_url
            .join(&full)
            .map_err(|e| StorageError::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            request.basic_auth(username, Some(password))
        } else {
            request
        }
    }

    async fn send(&self, request: RequestBuilder, path: &str, verb: &str) -> StorageResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        tracing::debug!("WebDAV {} {} -> {}", verb, path, status);

        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(StorageError::Protocol(format!(
                "WebDAV {} failed: {}",
                verb, status
            )));
        }
        Ok(response)
    }

    async fn propfind(&self, path: &str, depth: u8) -> StorageResult<Vec<DavResource>> {
        let url = self.build_url(path, depth > 0)?;
        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| StorageError::Protocol(e.to_string()))?;

        let request = self
            .request(method, url)
            .header("Depth", depth.to_string())
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY);

        let xml = self.send(request, path, "PROPFIND").await?.text().await?;
        parse_multistatus(&xml)
    }

    /// Metadata of the resource at `path` itself.
    async fn resource(&self, path: &str) -> StorageResult<DavResource> {
        self.propfind(path, 0)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    /// Store path of an href returned by the server, relative to the base URL.
    fn relative_path(&self, href: &str) -> StorageResult<String> {
        let decoded = urlencoding::decode(href)
            .map_err(|e| StorageError::Protocol(e.to_string()))?;
        // Some servers answer with absolute URLs.
        let href_path = match Url::parse(&decoded) {
            Ok(url) => url.path().to_string(),
            Err(_) => decoded.into_owned(),
        };

        let base = self.base_url.path().trim_end_matches('/');
        let rel = href_path.strip_prefix(base).unwrap_or(&href_path);
        Ok(rel.trim_matches('/').to_string())
    }

    fn entries_from(&self, resources: Vec<DavResource>, base_path: &str) -> Vec<FileEntry> {
        let base_path = base_path.trim_matches('/');
        resources
            .into_iter()
            .filter_map(|resource| {
                let rel = self.relative_path(&resource.href).ok()?;
                // The listed collection itself comes back as the first response.
                if rel == base_path || rel.is_empty() {
                    return None;
                }
                let name = rel.rsplit('/').next().unwrap_or("").to_string();
                if name.is_empty() {
                    return None;
                }
                Some(FileEntry {
                    path: child_path(base_path, &name),
                    name,
                    is_dir: resource.is_collection,
                    size: if resource.is_collection { None } else { resource.size },
                    modified_time: resource.modified,
                })
            })
            .collect()
    }

    fn list_inner<'a>(
        &'a self,
        path: &'a str,
        recursive: bool,
        entries: &'a mut Vec<FileEntry>,
    ) -> Pin<Box<dyn Future<Output = StorageResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let resources = self.propfind(path, 1).await?;
            for entry in self.entries_from(resources, path) {
                let sub_path = (recursive && entry.is_dir).then(|| entry.path.clone());
                entries.push(entry);
                if let Some(sub_path) = sub_path {
                    self.list_inner(&sub_path, true, entries).await?;
                }
            }
            Ok(())
        })
    }

    async fn transfer(&self, verb: &str, source: &str, destination: &str) -> StorageResult<()> {
        let method = Method::from_bytes(verb.as_bytes())
            .map_err(|e| StorageError::Protocol(e.to_string()))?;
        let is_dir = self.resource(source).await?.is_collection;
        let request = self
            .request(method, self.build_url(source, is_dir)?)
            .header("Destination", self.build_url(destination, is_dir)?.as_str())
            .header("Overwrite", "T");
        self.send(request, source, verb).await?;
        Ok(())
    }

    async fn put(&self, path: &str, contents: Bytes, opts: &WriteOptions) -> StorageResult<()> {
        let mut request = self.request(Method::PUT, self.build_url(path, false)?);
        if let Some(mime_type) = &opts.mime_type {
            request = request.header("Content-Type", mime_type.as_str());
        }
        self.send(request.body(contents), path, "PUT").await?;
        Ok(())
    }
}

fn parse_multistatus(xml: &str) -> StorageResult<Vec<DavResource>> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut resources = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut current: Option<DavResource> = None;
    let mut field: Option<&'static [u8]> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.name();
                match name.local_name().as_ref() {
                    b"response" => current = Some(DavResource::default()),
                    b"collection" => {
                        if let Some(resource) = current.as_mut() {
                            resource.is_collection = true;
                        }
                    }
                    b"href" => field = Some(b"href"),
                    b"getcontentlength" => field = Some(b"getcontentlength"),
                    b"getcontenttype" => field = Some(b"getcontenttype"),
                    b"getlastmodified" => field = Some(b"getlastmodified"),
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if e.name().local_name().as_ref() == b"collection" {
                    if let Some(resource) = current.as_mut() {
                        resource.is_collection = true;
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                match name.local_name().as_ref() {
                    b"response" => {
                        if let Some(resource) = current.take() {
                            if !resource.href.is_empty() {
                                resources.push(resource);
                            }
                        }
                    }
                    _ => field = None,
                }
            }
            Ok(Event::Text(e)) => {
                let (Some(resource), Some(tag)) = (current.as_mut(), field) else {
                    buf.clear();
                    continue;
                };
                let text = e
                    .unescape()
                    .map_err(|e| StorageError::Protocol(format!("XML parse error: {}", e)))?;
                match tag {
                    b"href" => resource.href = text.to_string(),
                    b"getcontentlength" => resource.size = text.parse().ok(),
                    b"getcontenttype" => {
                        resource.content_type = text.split(';').next().map(|s| s.trim().to_string())
                    }
                    b"getlastmodified" => {
                        resource.modified = chrono::DateTime::parse_from_rfc2822(&text)
                            .ok()
                            .map(|dt| dt.timestamp())
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(StorageError::Protocol(format!("XML parse error: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(resources)
}

#[async_trait]
impl StorageClient for WebDAVBackend {
    async fn exists(&self, path: &str) -> StorageResult<bool> {
        match self.resource(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        let request = self.request(Method::GET, self.build_url(path, false)?);
        Ok(self.send(request, path, "GET").await?.bytes().await?)
    }

    async fn read_stream(&self, path: &str) -> StorageResult<ByteStream> {
        let request = self.request(Method::GET, self.build_url(path, false)?);
        let response = self.send(request, path, "GET").await?;
        Ok(Box::new(StreamReader::new(response.bytes_stream())))
    }

    async fn write(&self, path: &str, contents: Bytes, opts: &WriteOptions) -> StorageResult<()> {
        self.put(path, contents, opts).await
    }

    async fn write_stream(
        &self,
        path: &str,
        mut stream: ByteStream,
        opts: &WriteOptions,
    ) -> StorageResult<()> {
        // reqwest needs a Sync body stream, so uploads are buffered.
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await?;
        self.put(path, Bytes::from(buffer), opts).await
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let request = self.request(Method::DELETE, self.build_url(path, false)?);
        self.send(request, path, "DELETE").await?;
        Ok(())
    }

    async fn delete_directory(&self, path: &str) -> StorageResult<()> {
        let request = self.request(Method::DELETE, self.build_url(path, true)?);
        self.send(request, path, "DELETE").await?;
        Ok(())
    }

    async fn create_directory(&self, path: &str) -> StorageResult<()> {
        let method =
            Method::from_bytes(b"MKCOL").map_err(|e| StorageError::Protocol(e.to_string()))?;
        let request = self.request(method, self.build_url(path, true)?);
        self.send(request, path, "MKCOL").await?;
        Ok(())
    }

    async fn copy(&self, source: &str, destination: &str) -> StorageResult<()> {
        self.transfer("COPY", source, destination).await
    }

    async fn move_object(&self, source: &str, destination: &str) -> StorageResult<()> {
        self.transfer("MOVE", source, destination).await
    }

    async fn list_contents(&self, path: &str, recursive: bool) -> StorageResult<Vec<FileEntry>> {
        let mut entries = Vec::new();
        self.list_inner(path, recursive, &mut entries).await?;
        Ok(entries)
    }

    async fn last_modified(&self, path: &str) -> StorageResult<i64> {
        self.resource(path)
            .await?
            .modified
            .ok_or_else(|| StorageError::metadata("last modified", path))
    }

    async fn file_size(&self, path: &str) -> StorageResult<u64> {
        let resource = self.resource(path).await?;
        if resource.is_collection {
            return Ok(0);
        }
        resource
            .size
            .ok_or_else(|| StorageError::metadata("file size", path))
    }

    async fn mime_type(&self, path: &str) -> StorageResult<String> {
        let resource = self.resource(path).await?;
        if resource.is_collection {
            return Err(StorageError::metadata("mime type", path));
        }
        Ok(resource
            .content_type
            .unwrap_or_else(|| OCTET_STREAM.to_string()))
    }
}

// Helper struct to convert a Stream into AsyncRead
struct StreamReader {
    stream: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    current_chunk: Option<Bytes>,
    position: usize,
}

impl StreamReader {
    fn new(stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static) -> Self {
        Self {
            stream: Box::pin(stream),
            current_chunk: None,
            position: 0,
        }
    }
}

impl AsyncRead for StreamReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            if let Some(chunk) = &self.current_chunk {
                if self.position < chunk.len() {
                    let to_read = std::cmp::min(buf.remaining(), chunk.len() - self.position);
                    buf.put_slice(&chunk[self.position..self.position + to_read]);
                    self.position += to_read;
                    return Poll::Ready(Ok(()));
                }
                self.current_chunk = None;
                self.position = 0;
            }

            match self.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    self.current_chunk = Some(chunk);
                    self.position = 0;
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, e)));
                }
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/dav/photos/</d:href>
    <d:propstat><d:prop>
      <d:resourcetype><d:collection/></d:resourcetype>
    </d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/dav/photos/sea%20side.jpg</d:href>
    <d:propstat><d:prop>
      <d:getcontentlength>1024</d:getcontentlength>
      <d:getcontenttype>image/jpeg; charset=binary</d:getcontenttype>
      <d:getlastmodified>Tue, 01 Oct 2024 10:00:00 GMT</d:getlastmodified>
      <d:resourcetype/>
    </d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/dav/photos/2024/</d:href>
    <d:propstat><d:prop>
      <d:resourcetype><d:collection/></d:resourcetype>
    </d:prop></d:propstat>
  </d:response>
</d:multistatus>"#;

    fn backend() -> WebDAVBackend {
        WebDAVBackend::new("http://localhost:8080/dav/".to_string(), None, None).unwrap()
    }

    #[test]
    fn parses_multistatus_responses() {
        let resources = parse_multistatus(LISTING).unwrap();
        assert_eq!(resources.len(), 3);
        assert!(resources[0].is_collection);

        let file = &resources[1];
        assert!(!file.is_collection);
        assert_eq!(file.size, Some(1024));
        assert_eq!(file.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(file.modified, Some(1_727_776_800));
    }

    #[test]
    fn listing_skips_the_collection_itself() {
        let resources = parse_multistatus(LISTING).unwrap();
        let entries = backend().entries_from(resources, "photos");

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "photos/sea side.jpg");
        assert_eq!(entries[0].size, Some(1024));
        assert!(entries[1].is_dir);
        assert_eq!(entries[1].path, "photos/2024");
        assert_eq!(entries[1].size, None);
    }

    #[test]
    fn builds_urls_under_the_base() {
        let dav = backend();
        assert_eq!(
            dav.build_url("photos/a.jpg", false).unwrap().as_str(),
            "http://localhost:8080/dav/photos/a.jpg"
        );
        assert_eq!(
            dav.build_url("photos", true).unwrap().as_str(),
            "http://localhost:8080/dav/photos/"
        );
        assert_eq!(dav.build_url("", true).unwrap().as_str(), "http://localhost:8080/dav/");
    }

    #[test]
    fn malformed_xml_is_a_protocol_error() {
        let err = parse_multistatus("<d:multistatus><d:response></d:oops>").unwrap_err();
        assert!(matches!(err, StorageError::Protocol(_)));
    }
}
