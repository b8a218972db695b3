use alumni_portal::storage::{MockStorageService, S3StorageClient, StorageService, attachment_key};
use std::time::Duration;
use uuid::Uuid;

#[cfg(test)]
mod mock_tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_put_and_delete() {
        let mock = MockStorageService::new();
        mock.put_object("achievements/s/a/0-cert.pdf", vec![1, 2, 3], "application/pdf")
            .await
            .unwrap();
        assert_eq!(mock.object_keys(), vec!["achievements/s/a/0-cert.pdf"]);

        mock.delete_object("achievements/s/a/0-cert.pdf").await.unwrap();
        assert!(mock.object_keys().is_empty());
    }

    #[tokio::test]
    async fn test_mock_presigned_download() {
        let mock = MockStorageService::new();
        let url = mock
            .presigned_download_url("achievements/s/a/0-cert.pdf", Duration::from_secs(900))
            .await
            .unwrap();

        assert!(url.contains("signature=fake"));
        assert!(url.contains("expires=900"));
        assert!(url.contains("achievements/s/a/0-cert.pdf"));
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockStorageService::new_failing();
        assert!(mock.put_object("k", vec![1], "image/png").await.is_err());
        assert!(mock.delete_object("k").await.is_err());
        assert!(
            mock.presigned_download_url("k", Duration::from_secs(60))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_mock_fails_after_limit() {
        let mock = MockStorageService::failing_after(2);
        assert!(mock.put_object("a", vec![1], "image/png").await.is_ok());
        assert!(mock.put_object("b", vec![1], "image/png").await.is_ok());
        assert!(mock.put_object("c", vec![1], "image/png").await.is_err());
        assert_eq!(mock.object_keys(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_mock_sanitization() {
        let mock = MockStorageService::new();
        let url = mock
            .presigned_download_url("../../etc/passwd", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!url.contains(".."));
    }

    #[test]
    fn test_attachment_keys_are_namespaced() {
        let student = Uuid::new_v4().to_string();
        let achievement = Uuid::new_v4().to_string();
        let key = attachment_key(&student, &achievement, 3, "Scan 01.PNG");
        assert_eq!(key, format!("achievements/{student}/{achievement}/3-Scan 01.PNG"));
    }
}

#[cfg(test)]
mod s3_tests {
    use super::*;

    #[tokio::test]
    async fn test_s3_presigned_download_url_format() {
        let client = S3StorageClient::new(
            "http://localhost:9000",
            "us-east-1",
            "testkey",
            "testsecret",
            "testbucket",
        )
        .await;

        let key = format!("achievements/{}/report.pdf", Uuid::new_v4());
        let url = client
            .presigned_download_url(&key, Duration::from_secs(900))
            .await
            .expect("presigning is local and needs no server");

        assert!(url.starts_with("http://localhost:9000/testbucket/"));
        assert!(url.contains(&key));
        assert!(url.contains("X-Amz-Expires=900"));
    }
}
