mod test_media_gateway;
